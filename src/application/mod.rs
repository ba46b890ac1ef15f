//! Application layer with conversion use cases and the shared pipeline.

/// Shared services.
pub mod services;
/// Use case implementations.
pub mod use_cases;

pub use services::{ArtifactProducer, ConversionPipeline};
pub use use_cases::{StaticConverter, StickerConverter, TgsConverter, WebmConverter};
