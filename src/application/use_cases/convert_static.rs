//! Still image sticker to PNG conversion.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::application::services::{ArtifactProducer, ConversionPipeline};
use crate::domain::entities::{ArtifactFormat, ConversionRequest, EncodeSettings, url_extension};
use crate::domain::errors::ConversionResult;
use crate::domain::ports::{DownloaderPort, MediaToolsPort};
use crate::infrastructure::cache::Workspace;

/// Extensions kept for the temporary download name.
const KNOWN_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "gif"];

/// Returns the extension for the temporary download file.
///
/// Only used for naming; the image is decoded by content.
#[must_use]
pub fn download_extension(url: &str) -> &'static str {
    url_extension(url)
        .and_then(|ext| KNOWN_EXTENSIONS.into_iter().find(|known| *known == ext))
        .unwrap_or("img")
}

/// Resizes still stickers to the target width and stores them as PNG.
#[derive(Clone)]
pub struct StaticConverter {
    downloader: Arc<dyn DownloaderPort>,
    tools: Arc<dyn MediaToolsPort>,
    settings: EncodeSettings,
    pipeline: Arc<ConversionPipeline>,
}

impl StaticConverter {
    /// Creates new static converter.
    #[must_use]
    pub const fn new(
        downloader: Arc<dyn DownloaderPort>,
        tools: Arc<dyn MediaToolsPort>,
        settings: EncodeSettings,
        pipeline: Arc<ConversionPipeline>,
    ) -> Self {
        Self {
            downloader,
            tools,
            settings,
            pipeline,
        }
    }

    /// Returns the cached PNG for `request`, converting on a miss.
    ///
    /// # Errors
    /// Returns `DownloadFailure`, `DecodeFailure` for undecodable images, or
    /// `CacheWriteFailure`.
    pub async fn convert(&self, request: &ConversionRequest) -> ConversionResult<PathBuf> {
        self.pipeline.resolve(self, request).await
    }
}

#[async_trait]
impl ArtifactProducer for StaticConverter {
    fn format(&self) -> ArtifactFormat {
        ArtifactFormat::Png
    }

    fn label(&self) -> &'static str {
        "static"
    }

    async fn produce(
        &self,
        request: &ConversionRequest,
        workspace: &Workspace,
    ) -> ConversionResult<PathBuf> {
        let ext = download_extension(request.source_url());
        let download = workspace.file(&format!("download.{ext}"));
        let bytes = self
            .downloader
            .download(request.source_url(), &download)
            .await?;
        debug!(url = request.source_url(), bytes, ext, "Downloaded still image");

        let output = workspace.file("output.png");
        self.tools
            .resize_still(&download, &output, &self.settings)
            .await?;
        Ok(output)
    }
}
