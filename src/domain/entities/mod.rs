//! Domain entity definitions.

mod artifact;
mod sticker;

pub use artifact::{ArtifactFormat, CacheKey, CachedArtifact, EncodeSettings};
pub use sticker::{ConversionRequest, StickerKind, url_extension};
