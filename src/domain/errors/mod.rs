//! Domain error types.

mod conversion_error;

pub use conversion_error::{ConversionError, ConversionResult};
