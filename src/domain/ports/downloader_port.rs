//! Port definition for fetching remote sticker assets.

use std::path::Path;

use async_trait::async_trait;

use crate::domain::errors::ConversionResult;

/// Port for downloading a remote asset to a local file.
/// Implementations must be thread-safe.
#[async_trait]
pub trait DownloaderPort: Send + Sync {
    /// Downloads `url` into `destination`, returning the number of bytes written.
    ///
    /// A partially written destination may remain on failure; callers own
    /// the directory it lives in and clean it up.
    async fn download(&self, url: &str, destination: &Path) -> ConversionResult<u64>;
}
