//! WEBM video sticker to GIF conversion.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::application::services::{ArtifactProducer, ConversionPipeline};
use crate::domain::entities::{ArtifactFormat, ConversionRequest, EncodeSettings};
use crate::domain::errors::{ConversionError, ConversionResult};
use crate::domain::ports::{DownloaderPort, MediaToolsPort};
use crate::infrastructure::cache::Workspace;

/// Converts WEBM stickers by extracting frames and re-encoding them as GIF.
#[derive(Clone)]
pub struct WebmConverter {
    downloader: Arc<dyn DownloaderPort>,
    tools: Arc<dyn MediaToolsPort>,
    settings: EncodeSettings,
    pipeline: Arc<ConversionPipeline>,
}

impl WebmConverter {
    /// Creates new WEBM converter.
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

    /// Returns the cached GIF for `request`, converting on a miss.
    ///
    /// # Errors
    /// Returns the first failing step's error; nothing is left in the cache
    /// or the workspace root.
    pub async fn convert(&self, request: &ConversionRequest) -> ConversionResult<PathBuf> {
        self.pipeline.resolve(self, request).await
    }
}

#[async_trait]
impl ArtifactProducer for WebmConverter {
    fn format(&self) -> ArtifactFormat {
        ArtifactFormat::Gif
    }

    fn label(&self) -> &'static str {
        "webm"
    }

    async fn produce(
        &self,
        request: &ConversionRequest,
        workspace: &Workspace,
    ) -> ConversionResult<PathBuf> {
        let source = workspace.file("source.webm");
        let bytes = self
            .downloader
            .download(request.source_url(), &source)
            .await?;
        debug!(url = request.source_url(), bytes, "Downloaded webm source");

        let frames_dir = workspace.frames_dir().await?;
        self.tools
            .extract_frames(&source, &frames_dir, &self.settings)
            .await?;

        let frames = workspace.frames().await?;
        if frames.is_empty() {
            return Err(ConversionError::tool("ffmpeg", "produced no frames"));
        }
        debug!(frames = frames.len(), "Extracted webm frames");

        let output = workspace.file("output.gif");
        self.tools
            .encode_gif(&frames, &output, &self.settings)
            .await?;
        Ok(output)
    }
}
