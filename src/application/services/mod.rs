pub mod pipeline;

pub use pipeline::{ArtifactProducer, ConversionPipeline};
