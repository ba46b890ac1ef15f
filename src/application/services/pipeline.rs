//! Shared resolve flow for every converter.
//!
//! `resolve` checks the cache, de-duplicates concurrent requests for the
//! same artifact, runs the producer inside a fresh workspace, commits the
//! result and cleans up on every path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::domain::{
    ArtifactFormat, CacheKey, ConversionError, ConversionRequest, ConversionResult,
};
use crate::infrastructure::cache::{
    ContentAddressedCache, Flight, InFlightRegistry, Workspace, WorkspaceRoot,
};

/// One conversion strategy: turns a request into a file inside a workspace.
#[async_trait]
pub trait ArtifactProducer: Send + Sync {
    /// Format of the produced artifact.
    fn format(&self) -> ArtifactFormat;

    /// Prefix for workspace directory names.
    fn label(&self) -> &'static str;

    /// Produces the artifact inside `workspace` and returns its path there.
    async fn produce(
        &self,
        request: &ConversionRequest,
        workspace: &Workspace,
    ) -> ConversionResult<PathBuf>;
}

type FlightKey = (CacheKey, ArtifactFormat);

/// Cache-backed, de-duplicating conversion runner.
#[derive(Debug)]
pub struct ConversionPipeline {
    cache: Arc<ContentAddressedCache>,
    workspaces: WorkspaceRoot,
    inflight: InFlightRegistry<FlightKey, ConversionResult<PathBuf>>,
}

impl ConversionPipeline {
    /// Creates a pipeline over `cache`, creating workspaces under `workspaces`.
    #[must_use]
    pub fn new(cache: Arc<ContentAddressedCache>, workspaces: WorkspaceRoot) -> Self {
        Self {
            cache,
            workspaces,
            inflight: InFlightRegistry::new(),
        }
    }

    /// Returns the artifact cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<ContentAddressedCache> {
        &self.cache
    }

    /// Returns the workspace root.
    #[must_use]
    pub const fn workspaces(&self) -> &WorkspaceRoot {
        &self.workspaces
    }

    /// Number of conversions currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Returns the cached artifact for `request`, producing it on a miss.
    ///
    /// A hit refreshes the artifact's modification time, so the sweeper's
    /// minimum age keeps it on disk while the caller uses it.
    ///
    /// Concurrent calls for the same key share one conversion; followers
    /// receive the leader's result, including its error.
    ///
    /// # Errors
    /// Returns the producer's error, `CacheWriteFailure` if the commit fails,
    /// `WorkspaceFailure` if no workspace can be created, or
    /// `ConversionAbandoned` if the leading call went away.
    pub async fn resolve(
        &self,
        producer: &dyn ArtifactProducer,
        request: &ConversionRequest,
    ) -> ConversionResult<PathBuf> {
        let key = CacheKey::for_request(request);
        let format = producer.format();

        if self.cache.touch(&key, format).await {
            let path = self.cache.path_for(&key, format);
            debug!(key = %key, path = %path.display(), "Cache hit");
            return Ok(path);
        }

        match self.inflight.join(&(key.clone(), format)) {
            Flight::Follower(waiter) => {
                debug!(key = %key, "Awaiting in-flight conversion");
                waiter
                    .wait()
                    .await
                    .unwrap_or_else(|| Err(ConversionError::abandoned(key.as_str())))
            }
            Flight::Leader(guard) => {
                let result = self.convert(producer, request, &key, format).await;
                guard.complete(result.clone());
                result
            }
        }
    }

    async fn convert(
        &self,
        producer: &dyn ArtifactProducer,
        request: &ConversionRequest,
        key: &CacheKey,
        format: ArtifactFormat,
    ) -> ConversionResult<PathBuf> {
        // A previous leader may have committed between the probe and the join.
        if self.cache.exists(key, format).await {
            return Ok(self.cache.path_for(key, format));
        }

        debug!(
            key = %key,
            kind = %request.kind(),
            url = request.source_url(),
            "Cache miss, converting"
        );
        let started = Instant::now();
        let workspace = self.workspaces.create(producer.label())?;

        let outcome = match producer.produce(request, &workspace).await {
            Ok(produced) => self.cache.commit(key, format, &produced).await,
            Err(e) => Err(e),
        };
        workspace.close();

        match outcome {
            Ok(path) => {
                info!(
                    key = %key,
                    kind = %request.kind(),
                    path = %path.display(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "Conversion complete"
                );
                Ok(path)
            }
            Err(e) => {
                self.cache.discard(key, format).await;
                warn!(key = %key, kind = e.kind(), error = %e, "Conversion failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures_util::future::join_all;
    use tempfile::TempDir;

    /// Producer writing a fixed payload, or failing, after an optional delay.
    struct StubProducer {
        payload: Option<&'static [u8]>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl StubProducer {
        fn ok(payload: &'static [u8]) -> Self {
            Self {
                payload: Some(payload),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                payload: None,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl ArtifactProducer for StubProducer {
        fn format(&self) -> ArtifactFormat {
            ArtifactFormat::Gif
        }

        fn label(&self) -> &'static str {
            "stub"
        }

        async fn produce(
            &self,
            _request: &ConversionRequest,
            workspace: &Workspace,
        ) -> ConversionResult<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let output = workspace.file("output.gif");
            match self.payload {
                Some(payload) => {
                    tokio::fs::write(&output, payload).await.unwrap();
                    Ok(output)
                }
                None => {
                    tokio::fs::write(&output, b"partial").await.unwrap();
                    Err(ConversionError::render("boom"))
                }
            }
        }
    }

    struct Fixture {
        _dir: TempDir,
        pipeline: ConversionPipeline,
        workspace_root: PathBuf,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentAddressedCache::open(dir.path().join("cache")).await.unwrap();
        let workspace_root = dir.path().join("work");
        let pipeline =
            ConversionPipeline::new(Arc::new(cache), WorkspaceRoot::new(workspace_root.clone()));
        Fixture {
            _dir: dir,
            pipeline,
            workspace_root,
        }
    }

    fn request() -> ConversionRequest {
        ConversionRequest::new("https://example/file.webm", Some("abc123"))
    }

    async fn is_empty_dir(path: &std::path::Path) -> bool {
        match tokio::fs::read_dir(path).await {
            Ok(mut entries) => entries.next_entry().await.unwrap().is_none(),
            Err(_) => true,
        }
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let fx = fixture().await;
        let producer = StubProducer::ok(b"GIF89a");

        let first = fx.pipeline.resolve(&producer, &request()).await.unwrap();
        let second = fx.pipeline.resolve(&producer, &request()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first.file_name().unwrap(),
            "e99a18c428cb38d5f260853678922e03.gif"
        );
        assert_eq!(producer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(tokio::fs::read(&first).await.unwrap(), b"GIF89a");
        assert!(is_empty_dir(&fx.workspace_root).await);
    }

    #[tokio::test]
    async fn test_hit_refreshes_artifact_age() {
        let fx = fixture().await;
        let producer = StubProducer::ok(b"GIF89a");
        let path = fx.pipeline.resolve(&producer, &request()).await.unwrap();

        let hour_ago = std::time::SystemTime::now() - Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(hour_ago)
            .unwrap();

        let hit = fx.pipeline.resolve(&producer, &request()).await.unwrap();

        assert_eq!(hit, path);
        assert_eq!(producer.calls.load(Ordering::SeqCst), 1);
        let age = std::fs::metadata(&hit)
            .unwrap()
            .modified()
            .unwrap()
            .elapsed()
            .unwrap_or_default();
        assert!(age < Duration::from_secs(60), "artifact still aged {age:?}");
    }

    #[tokio::test]
    async fn test_failure_leaves_no_trace() {
        let fx = fixture().await;
        let producer = StubProducer::failing();

        let err = fx.pipeline.resolve(&producer, &request()).await.unwrap_err();

        assert_eq!(err, ConversionError::render("boom"));
        assert!(fx.pipeline.cache().entries().await.unwrap().is_empty());
        assert!(is_empty_dir(&fx.workspace_root).await);
        assert_eq!(fx.pipeline.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let fx = fixture().await;

        fx.pipeline
            .resolve(&StubProducer::failing(), &request())
            .await
            .unwrap_err();
        let path = fx
            .pipeline
            .resolve(&StubProducer::ok(b"GIF89a"), &request())
            .await
            .unwrap();

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_conversion() {
        let fx = fixture().await;
        let producer = StubProducer::ok(b"GIF89a").slow(Duration::from_millis(100));
        let request = request();

        let results = join_all((0..8).map(|_| fx.pipeline.resolve(&producer, &request))).await;

        assert_eq!(producer.calls.load(Ordering::SeqCst), 1);
        let paths: Vec<PathBuf> = results.into_iter().map(Result::unwrap).collect();
        assert!(paths.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(fx.pipeline.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_followers_share_leader_error() {
        let fx = fixture().await;
        let producer = StubProducer::failing().slow(Duration::from_millis(100));
        let request = request();

        let results = join_all((0..4).map(|_| fx.pipeline.resolve(&producer, &request))).await;

        assert_eq!(producer.calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap_err(), ConversionError::render("boom"));
        }
    }

    #[tokio::test]
    async fn test_distinct_keys_convert_independently() {
        let fx = fixture().await;
        let producer = StubProducer::ok(b"GIF89a");

        let a = fx
            .pipeline
            .resolve(&producer, &ConversionRequest::new("https://example/a.webm", None))
            .await
            .unwrap();
        let b = fx
            .pipeline
            .resolve(&producer, &ConversionRequest::new("https://example/b.webm", None))
            .await
            .unwrap();

        assert_ne!(a, b);
        assert_eq!(producer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unusable_workspace_root() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentAddressedCache::open(dir.path().join("cache")).await.unwrap();
        let blocker = dir.path().join("file");
        tokio::fs::write(&blocker, b"x").await.unwrap();
        let pipeline = ConversionPipeline::new(Arc::new(cache), WorkspaceRoot::new(blocker));

        let err = pipeline
            .resolve(&StubProducer::ok(b"GIF89a"), &request())
            .await
            .unwrap_err();

        assert!(matches!(err, ConversionError::WorkspaceFailure { .. }));
    }
}
