//! Entry point dispatching sticker conversions by source kind.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::{StaticConverter, TgsConverter, WebmConverter};
use crate::application::services::ConversionPipeline;
use crate::domain::entities::{ConversionRequest, EncodeSettings, StickerKind};
use crate::domain::errors::ConversionResult;
use crate::domain::ports::{DownloaderPort, MediaToolsPort};
use crate::infrastructure::cache::{
    ArtifactLease, ArtifactLeases, CacheEvictionSweeper, ContentAddressedCache, SweeperConfig,
};

/// Converts any supported sticker into a cached, re-uploadable artifact.
#[derive(Clone)]
pub struct StickerConverter {
    webm: WebmConverter,
    tgs: TgsConverter,
    still: StaticConverter,
    pipeline: Arc<ConversionPipeline>,
    leases: ArtifactLeases,
}

impl StickerConverter {
    /// Creates the converter set sharing one pipeline.
    #[must_use]
    pub fn new(
        downloader: Arc<dyn DownloaderPort>,
        tools: Arc<dyn MediaToolsPort>,
        settings: EncodeSettings,
        pipeline: Arc<ConversionPipeline>,
    ) -> Self {
        Self {
            webm: WebmConverter::new(
                Arc::clone(&downloader),
                Arc::clone(&tools),
                settings,
                Arc::clone(&pipeline),
            ),
            tgs: TgsConverter::new(
                Arc::clone(&downloader),
                Arc::clone(&tools),
                settings,
                Arc::clone(&pipeline),
            ),
            still: StaticConverter::new(downloader, tools, settings, Arc::clone(&pipeline)),
            pipeline,
            leases: ArtifactLeases::new(),
        }
    }

    /// Converts the sticker at `source_url`.
    ///
    /// `stable_id`, when given, is the cache identity instead of the URL.
    /// Returns `Ok(None)` when a TGS sticker cannot be rendered; callers
    /// fall back to the original asset. The returned artifact is fresh for
    /// at least the sweeper's minimum age; hold a [`checkout`](Self::checkout)
    /// lease for longer reads.
    ///
    /// # Errors
    /// Returns the conversion error for WEBM and still stickers.
    pub async fn convert(
        &self,
        source_url: &str,
        stable_id: Option<&str>,
    ) -> ConversionResult<Option<PathBuf>> {
        let request = ConversionRequest::new(source_url, stable_id);
        debug!(kind = %request.kind(), url = source_url, "Converting sticker");

        match request.kind() {
            StickerKind::Webm => self.webm.convert(&request).await.map(Some),
            StickerKind::Tgs => Ok(self.tgs.convert(&request).await),
            StickerKind::Static => self.still.convert(&request).await.map(Some),
        }
    }

    /// Protects `path` from eviction until the lease is dropped.
    #[must_use]
    pub fn checkout(&self, path: &Path) -> ArtifactLease {
        self.leases.acquire(path)
    }

    /// Returns the shared lease table.
    #[must_use]
    pub const fn leases(&self) -> &ArtifactLeases {
        &self.leases
    }

    /// Returns the artifact cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<ContentAddressedCache> {
        self.pipeline.cache()
    }

    /// Builds an eviction sweeper over this converter's cache and leases.
    #[must_use]
    pub fn sweeper(&self, config: SweeperConfig) -> CacheEvictionSweeper {
        CacheEvictionSweeper::new(Arc::clone(self.cache()), self.leases.clone(), config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures_util::future::join_all;
    use tempfile::TempDir;

    use crate::domain::errors::ConversionError;
    use crate::domain::ports::mocks::{MockDownloader, MockMediaTools};
    use crate::infrastructure::cache::WorkspaceRoot;

    struct Fixture {
        dir: TempDir,
        downloader: Arc<MockDownloader>,
        tools: Arc<MockMediaTools>,
        converter: StickerConverter,
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
        let converter = StickerConverter::new(
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

    #[tokio::test]
    async fn test_webm_end_to_end() {
        let fx = fixture(MockDownloader::serving("webm"), MockMediaTools::new()).await;

        let path = fx
            .converter
            .convert("https://example/file.webm", Some("abc123"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            path,
            fx.dir
                .path()
                .join("cache")
                .join("e99a18c428cb38d5f260853678922e03.gif")
        );

        let again = fx
            .converter
            .convert("https://example/file.webm", Some("abc123"))
            .await
            .unwrap();
        assert_eq!(again, Some(path));
        assert_eq!(fx.downloader.calls(), 1);
    }

    #[tokio::test]
    async fn test_dispatches_still_images_to_png() {
        let fx = fixture(MockDownloader::serving("png"), MockMediaTools::new()).await;

        let path = fx
            .converter
            .convert("https://example/emoji.webp", None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(path.extension().unwrap(), "png");
        assert_eq!(fx.tools.resize_calls(), 1);
        assert_eq!(fx.tools.extract_calls(), 0);
    }

    #[tokio::test]
    async fn test_tgs_failure_is_none_not_error() {
        let fx = fixture(MockDownloader::serving("not gzip"), MockMediaTools::new()).await;

        let result = fx
            .converter
            .convert("https://example/sticker.tgs", Some("tgs-7"))
            .await;

        assert_eq!(result, Ok(None));
    }

    #[tokio::test]
    async fn test_static_failure_propagates() {
        let fx = fixture(MockDownloader::failing(), MockMediaTools::new()).await;

        let err = fx
            .converter
            .convert("https://example/emoji.png", None)
            .await
            .unwrap_err();

        assert!(matches!(err, ConversionError::DownloadFailure { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_converts_download_once() {
        let fx = fixture(
            MockDownloader::serving("webm").with_delay(Duration::from_millis(100)),
            MockMediaTools::new(),
        )
        .await;

        let results = join_all(
            (0..5).map(|_| fx.converter.convert("https://example/file.webm", Some("abc123"))),
        )
        .await;

        assert_eq!(fx.downloader.calls(), 1);
        assert_eq!(fx.tools.encode_calls(), 1);
        let paths: Vec<_> = results.into_iter().map(|r| r.unwrap().unwrap()).collect();
        assert!(paths.iter().all(|p| *p == paths[0]));
    }

    #[tokio::test]
    async fn test_cache_hit_survives_next_sweep() {
        let fx = fixture(MockDownloader::serving("webm"), MockMediaTools::new()).await;
        let url = "https://example/old.webm";
        let path = fx.converter.convert(url, None).await.unwrap().unwrap();

        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(std::time::SystemTime::now() - Duration::from_secs(3600))
            .unwrap();

        let hit = fx.converter.convert(url, None).await.unwrap().unwrap();
        let report = fx
            .converter
            .sweeper(SweeperConfig {
                budget_bytes: 0,
                ..SweeperConfig::default()
            })
            .sweep_once()
            .await
            .unwrap();

        assert_eq!(hit, path);
        assert!(hit.exists());
        assert!(report.evicted.is_empty());
        assert_eq!(report.skipped, 1);
        assert_eq!(fx.downloader.calls(), 1);
    }

    #[tokio::test]
    async fn test_checked_out_artifact_survives_sweep() {
        let fx = fixture(MockDownloader::serving("webm"), MockMediaTools::new()).await;
        let leased = fx
            .converter
            .convert("https://example/a.webm", None)
            .await
            .unwrap()
            .unwrap();
        let unleased = fx
            .converter
            .convert("https://example/b.webm", None)
            .await
            .unwrap()
            .unwrap();

        let lease = fx.converter.checkout(&leased);
        let sweeper = fx.converter.sweeper(SweeperConfig {
            budget_bytes: 0,
            interval: Duration::from_secs(60),
            min_age: Duration::ZERO,
        });
        let report = sweeper.sweep_once().await.unwrap();

        assert!(leased.exists());
        assert!(!unleased.exists());
        assert_eq!(report.skipped, 1);

        drop(lease);
        sweeper.sweep_once().await.unwrap();
        assert!(!leased.exists());
    }
}
