//! Cache key and artifact value objects.

use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use md5::{Digest, Md5};

use super::ConversionRequest;

/// Content-addressed cache key: hex MD5 digest of the sticker's identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives a key from any identifier.
    #[must_use]
    pub fn derive(identifier: &str) -> Self {
        let mut hasher = Md5::new();
        hasher.update(identifier.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Derives the key for a request, preferring its stable identifier.
    #[must_use]
    pub fn for_request(request: &ConversionRequest) -> Self {
        Self::derive(request.cache_identity())
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Output format of a cached artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactFormat {
    /// Animated GIF.
    Gif,
    /// WebP image.
    Webp,
    /// PNG image.
    Png,
    /// JPEG image.
    Jpg,
}

impl ArtifactFormat {
    /// All formats the cache recognizes.
    pub const ALL: [Self; 4] = [Self::Gif, Self::Webp, Self::Png, Self::Jpg];

    /// Returns the file extension (without dot).
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Png => "png",
            Self::Jpg => "jpg",
        }
    }

    /// Parses a file extension.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.extension().eq_ignore_ascii_case(ext))
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A completed conversion stored in the cache directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    /// Absolute path of the artifact.
    pub path: PathBuf,
    /// Artifact format, from the file extension.
    pub format: ArtifactFormat,
    /// Size on disk.
    pub size_bytes: u64,
    /// Last modification time.
    pub modified: SystemTime,
}

/// Target output parameters shared by every converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSettings {
    /// Output frame rate.
    pub fps: u32,
    /// Output width in pixels; height follows the aspect ratio.
    pub width: u32,
    /// GIF encoder quality (1-100).
    pub quality: u8,
}

impl EncodeSettings {
    /// Fixed 50 fps target.
    pub const DEFAULT_FPS: u32 = 50;
    /// Fixed 256 px target.
    pub const DEFAULT_WIDTH: u32 = 256;
    /// Encoder quality used when none is configured.
    pub const DEFAULT_QUALITY: u8 = 90;
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            fps: Self::DEFAULT_FPS,
            width: Self::DEFAULT_WIDTH,
            quality: Self::DEFAULT_QUALITY,
        }
    }
}
