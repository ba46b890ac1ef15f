//! TGS (gzipped Lottie) sticker to GIF conversion.
//!
//! Frames are rasterized in-process on the blocking pool, one render
//! context per call, then encoded with the same toolchain as WEBM stickers.
//! Failures degrade to `None` so callers can fall back to the raw asset.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::application::services::{ArtifactProducer, ConversionPipeline};
use crate::domain::entities::{ArtifactFormat, ConversionRequest, EncodeSettings};
use crate::domain::errors::{ConversionError, ConversionResult};
use crate::domain::ports::{DownloaderPort, MediaToolsPort};
use crate::infrastructure::cache::Workspace;
use crate::infrastructure::lottie::{AnimationDocument, rasterize_frames};

/// Converts TGS stickers by rendering every sampled frame and encoding a GIF.
#[derive(Clone)]
pub struct TgsConverter {
    downloader: Arc<dyn DownloaderPort>,
    tools: Arc<dyn MediaToolsPort>,
    settings: EncodeSettings,
    pipeline: Arc<ConversionPipeline>,
}

impl TgsConverter {
    /// Creates new TGS converter.
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

    /// Returns the cached GIF for `request`, or `None` if it cannot be produced.
    pub async fn convert(&self, request: &ConversionRequest) -> Option<PathBuf> {
        match self.try_convert(request).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(
                    url = request.source_url(),
                    kind = e.kind(),
                    error = %e,
                    "TGS conversion failed, falling back"
                );
                None
            }
        }
    }

    /// Like [`convert`](Self::convert), but keeps the failure.
    ///
    /// # Errors
    /// Returns `DecodeFailure` for payloads that are not gzipped Lottie JSON,
    /// `RenderFailure` if no frame could be drawn, or the first failing
    /// download or encode step's error.
    pub async fn try_convert(&self, request: &ConversionRequest) -> ConversionResult<PathBuf> {
        self.pipeline.resolve(self, request).await
    }
}

#[async_trait]
impl ArtifactProducer for TgsConverter {
    fn format(&self) -> ArtifactFormat {
        ArtifactFormat::Gif
    }

    fn label(&self) -> &'static str {
        "tgs"
    }

    async fn produce(
        &self,
        request: &ConversionRequest,
        workspace: &Workspace,
    ) -> ConversionResult<PathBuf> {
        let source = workspace.file("source.tgs");
        self.downloader
            .download(request.source_url(), &source)
            .await?;

        let payload = tokio::fs::read(&source)
            .await
            .map_err(|e| ConversionError::decode(format!("Failed to read tgs payload: {e}")))?;

        let frames_dir = workspace.frames_dir().await?;
        let settings = self.settings;
        let target = frames_dir.clone();
        let rendered = tokio::task::spawn_blocking(move || {
            let document = AnimationDocument::from_tgs(&payload)?;
            debug!(
                width = document.width,
                height = document.height,
                fps = document.frame_rate,
                frames = document.total_frames(),
                "Parsed animation"
            );
            rasterize_frames(&document, &target, &settings)
        })
        .await
        .map_err(|e| ConversionError::render(format!("render task failed: {e}")))??;
        debug!(frames = rendered, "Rendered tgs frames");

        let frames = workspace.frames().await?;
        let output = workspace.file("output.gif");
        self.tools
            .encode_gif(&frames, &output, &self.settings)
            .await?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;
    use serde_json::json;
    use tempfile::TempDir;

    use crate::domain::ports::mocks::{MockDownloader, MockMediaTools};
    use crate::infrastructure::cache::{ContentAddressedCache, WorkspaceRoot};

    struct Fixture {
        dir: TempDir,
        downloader: Arc<MockDownloader>,
        tools: Arc<MockMediaTools>,
        converter: TgsConverter,
    }

    async fn fixture(downloader: MockDownloader, tools: MockMediaTools) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentAddressedCache::open(dir.path().join("cache"))
            .await
            .unwrap();
        let pipeline = Arc::new(ConversionPipeline::new(
            Arc::new(cache),
            WorkspaceRoot::new(dir.path().join("work")),
        ));
        let downloader = Arc::new(downloader);
        let tools = Arc::new(tools);
        let converter = TgsConverter::new(
            downloader.clone(),
            tools.clone(),
            EncodeSettings::default(),
            pipeline,
        );
        Fixture {
            dir,
            downloader,
            tools,
            converter,
        }
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    fn sticker(fr: u32, op: u32) -> Vec<u8> {
        let doc = json!({
            "v": "5.5.2",
            "fr": fr,
            "ip": 0,
            "op": op,
            "w": 512,
            "h": 512,
            "layers": [{
                "ty": 4,
                "ind": 1,
                "ip": 0,
                "op": op,
                "st": 0,
                "ks": {
                    "p": {"a": 1, "k": [
                        {"t": 0, "s": [128, 256]},
                        {"t": op, "s": [384, 256]}
                    ]}
                },
                "shapes": [
                    {"ty": "el", "p": {"a": 0, "k": [0, 0]}, "s": {"a": 0, "k": [120, 120]}},
                    {"ty": "fl", "c": {"a": 0, "k": [1, 0.5, 0, 1]}, "o": {"a": 0, "k": 100}}
                ]
            }]
        });
        gzip(doc.to_string().as_bytes())
    }

    fn request() -> ConversionRequest {
        ConversionRequest::new("https://example/sticker.tgs", Some("tgs-1"))
    }

    fn assert_no_trace(fx: &Fixture) {
        assert_eq!(
            std::fs::read_dir(fx.dir.path().join("cache")).unwrap().count(),
            0
        );
        let work = fx.dir.path().join("work");
        if work.exists() {
            assert_eq!(std::fs::read_dir(work).unwrap().count(), 0);
        }
    }

    #[tokio::test]
    async fn test_renders_valid_sticker() {
        let fx = fixture(MockDownloader::serving(sticker(60, 30)), MockMediaTools::new()).await;

        let path = fx.converter.convert(&request()).await.unwrap();

        assert_eq!(path.extension().unwrap(), "gif");
        assert_eq!(std::fs::read(&path).unwrap(), b"GIF89a");
        assert_eq!(fx.tools.last_frame_count(), 30);
    }

    #[tokio::test]
    async fn test_high_frame_rate_is_strided() {
        let fx = fixture(MockDownloader::serving(sticker(100, 40)), MockMediaTools::new()).await;

        fx.converter.convert(&request()).await.unwrap();

        assert_eq!(fx.tools.last_frame_count(), 20);
    }

    #[tokio::test]
    async fn test_cached_after_first_render() {
        let fx = fixture(MockDownloader::serving(sticker(60, 10)), MockMediaTools::new()).await;

        let first = fx.converter.convert(&request()).await.unwrap();
        let second = fx.converter.convert(&request()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fx.downloader.calls(), 1);
        assert_eq!(fx.tools.encode_calls(), 1);
    }

    #[tokio::test]
    async fn test_non_gzip_payload_degrades_to_none() {
        let fx = fixture(
            MockDownloader::serving(&b"{\"fr\": 60}"[..]),
            MockMediaTools::new(),
        )
        .await;

        assert!(fx.converter.convert(&request()).await.is_none());
        assert_eq!(fx.tools.encode_calls(), 0);
        assert_no_trace(&fx);
    }

    #[tokio::test]
    async fn test_non_json_payload_degrades_to_none() {
        let fx = fixture(
            MockDownloader::serving(gzip(b"definitely not json")),
            MockMediaTools::new(),
        )
        .await;

        let err = fx.converter.try_convert(&request()).await.unwrap_err();
        assert!(matches!(err, ConversionError::DecodeFailure { .. }));
        assert!(fx.converter.convert(&request()).await.is_none());
        assert_no_trace(&fx);
    }

    #[tokio::test]
    async fn test_invalid_header_degrades_to_none() {
        let doc = json!({"fr": 60, "ip": 10, "op": 10, "w": 512, "h": 512, "layers": []});
        let fx = fixture(
            MockDownloader::serving(gzip(doc.to_string().as_bytes())),
            MockMediaTools::new(),
        )
        .await;

        assert!(fx.converter.convert(&request()).await.is_none());
        assert_no_trace(&fx);
    }

    #[tokio::test]
    async fn test_overlong_animation_is_rejected_before_rendering() {
        let fx = fixture(
            MockDownloader::serving(sticker(60, 1_000_000_000)),
            MockMediaTools::new(),
        )
        .await;

        let err = fx.converter.try_convert(&request()).await.unwrap_err();

        assert!(matches!(err, ConversionError::DecodeFailure { .. }));
        assert_eq!(fx.tools.encode_calls(), 0);
        assert_no_trace(&fx);
    }

    #[tokio::test]
    async fn test_download_failure_degrades_to_none() {
        let fx = fixture(MockDownloader::failing(), MockMediaTools::new()).await;

        assert!(fx.converter.convert(&request()).await.is_none());
        assert_no_trace(&fx);
    }

    #[tokio::test]
    async fn test_encode_failure_degrades_to_none() {
        let tools = MockMediaTools::new();
        tools.fail_encode();
        let fx = fixture(MockDownloader::serving(sticker(60, 5)), tools).await;

        let err = fx.converter.try_convert(&request()).await.unwrap_err();

        assert_eq!(err.kind(), "external_tool");
        assert!(fx.converter.convert(&request()).await.is_none());
        assert_no_trace(&fx);
    }
}
