//! Domain layer with core conversion entities and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{ArtifactFormat, CacheKey, ConversionRequest, EncodeSettings, StickerKind};
pub use errors::{ConversionError, ConversionResult};
pub use ports::{DownloaderPort, MediaToolsPort};
