//! Content-addressed artifact cache on the local filesystem.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs;
use tracing::{debug, trace, warn};

use crate::domain::entities::{ArtifactFormat, CacheKey, CachedArtifact};
use crate::domain::errors::{ConversionError, ConversionResult};

/// Prefix of staging files inside the cache directory. Hidden files are never
/// treated as artifacts.
const STAGING_PREFIX: &str = ".staging-";

/// Snapshot of cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of artifacts.
    pub entries: usize,
    /// Total artifact size in bytes.
    pub total_bytes: u64,
}

/// Flat directory of converted artifacts named `<key>.<ext>`.
///
/// No locking happens here; concurrent producers for one key are serialized
/// by the pipeline's in-flight registry.
#[derive(Debug, Clone)]
pub struct ContentAddressedCache {
    cache_dir: PathBuf,
}

impl ContentAddressedCache {
    /// Opens (creating if needed) a cache rooted at `cache_dir`.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be created.
    pub async fn open(cache_dir: PathBuf) -> ConversionResult<Self> {
        fs::create_dir_all(&cache_dir).await.map_err(|e| {
            ConversionError::cache_write(format!(
                "Failed to create cache dir {}: {e}",
                cache_dir.display()
            ))
        })?;
        Ok(Self { cache_dir })
    }

    /// Returns the cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the artifact path for a key. Pure, no I/O.
    #[must_use]
    pub fn path_for(&self, key: &CacheKey, format: ArtifactFormat) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{}", key.as_str(), format.extension()))
    }

    /// Checks whether a completed artifact exists.
    pub async fn exists(&self, key: &CacheKey, format: ArtifactFormat) -> bool {
        let path = self.path_for(key, format);
        let hit = fs::try_exists(&path).await.unwrap_or(false);
        trace!(key = %key, format = %format, hit, "Cache probe");
        hit
    }

    /// Refreshes the modification time of a completed artifact.
    ///
    /// A touched artifact counts as new for the sweeper's minimum age, so a
    /// path just handed out on a hit is not evicted by the next sweep.
    /// Returns false if the artifact does not exist.
    pub async fn touch(&self, key: &CacheKey, format: ArtifactFormat) -> bool {
        let path = self.path_for(key, format);
        let target = path.clone();
        let touched = tokio::task::spawn_blocking(move || {
            std::fs::OpenOptions::new()
                .write(true)
                .open(&target)?
                .set_modified(SystemTime::now())
        })
        .await
        .unwrap_or_else(|e| Err(io::Error::other(e)));

        match touched {
            Ok(()) => {
                trace!(key = %key, format = %format, "Refreshed cache artifact");
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(key = %key, path = %path.display(), error = %e, "Failed to refresh artifact timestamp");
                self.exists(key, format).await
            }
        }
    }

    /// Copies a produced file into the cache under `key`.
    ///
    /// The bytes are staged in a hidden file inside the cache directory and
    /// renamed into place, so the final name only ever refers to a complete
    /// artifact. The staging file is removed if any step fails.
    ///
    /// # Errors
    /// Returns `CacheWriteFailure` if the artifact cannot be persisted.
    pub async fn commit(
        &self,
        key: &CacheKey,
        format: ArtifactFormat,
        produced: &Path,
    ) -> ConversionResult<PathBuf> {
        let destination = self.path_for(key, format);
        let cache_dir = self.cache_dir.clone();
        let source = produced.to_path_buf();
        let target = destination.clone();

        let size = tokio::task::spawn_blocking(move || stage_and_persist(&cache_dir, &source, &target))
            .await
            .map_err(|e| ConversionError::cache_write(format!("Commit task panicked: {e}")))??;

        debug!(key = %key, path = %destination.display(), size, "Stored artifact in cache");
        Ok(destination)
    }

    /// Removes the artifact for `key` if present.
    pub async fn discard(&self, key: &CacheKey, format: ArtifactFormat) {
        let path = self.path_for(key, format);
        match fs::remove_file(&path).await {
            Ok(()) => debug!(key = %key, path = %path.display(), "Discarded cache artifact"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(key = %key, error = %e, "Failed to discard cache artifact"),
        }
    }

    /// Lists completed artifacts with their size and modification time.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be read.
    pub async fn entries(&self) -> io::Result<Vec<CachedArtifact>> {
        let mut entries = fs::read_dir(&self.cache_dir).await?;
        let mut artifacts = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(format) = artifact_format(&path) else {
                continue;
            };
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            artifacts.push(CachedArtifact {
                path,
                format,
                size_bytes: meta.len(),
                modified: meta.modified()?,
            });
        }

        Ok(artifacts)
    }

    /// Returns artifact count and total size.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be read.
    pub async fn stats(&self) -> io::Result<CacheStats> {
        let entries = self.entries().await?;
        Ok(CacheStats {
            entries: entries.len(),
            total_bytes: entries.iter().map(|a| a.size_bytes).sum(),
        })
    }
}

fn stage_and_persist(cache_dir: &Path, source: &Path, target: &Path) -> ConversionResult<u64> {
    let mut staged = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempfile_in(cache_dir)
        .map_err(|e| ConversionError::cache_write(format!("Failed to stage artifact: {e}")))?;

    let mut input = std::fs::File::open(source).map_err(|e| {
        ConversionError::cache_write(format!(
            "Failed to open produced file {}: {e}",
            source.display()
        ))
    })?;
    let size = io::copy(&mut input, staged.as_file_mut())
        .map_err(|e| ConversionError::cache_write(format!("Failed to copy artifact: {e}")))?;
    if size == 0 {
        return Err(ConversionError::cache_write("produced artifact is empty"));
    }

    staged
        .as_file()
        .sync_all()
        .map_err(|e| ConversionError::cache_write(format!("Failed to flush artifact: {e}")))?;
    staged.persist(target).map_err(|e| {
        ConversionError::cache_write(format!("Failed to persist artifact: {}", e.error))
    })?;

    Ok(size)
}

/// Returns the artifact format of a cache path, skipping hidden and unknown files.
fn artifact_format(path: &Path) -> Option<ArtifactFormat> {
    let name = path.file_name()?.to_str()?;
    if name.starts_with('.') {
        return None;
    }
    ArtifactFormat::from_extension(path.extension()?.to_str()?)
}
