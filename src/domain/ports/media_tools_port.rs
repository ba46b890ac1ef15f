//! Port definition for the media toolchain (frame extraction, GIF encoding,
//! still-image resizing).

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::entities::EncodeSettings;
use crate::domain::errors::ConversionResult;

/// Port for media transformation steps.
#[async_trait]
pub trait MediaToolsPort: Send + Sync {
    /// Extracts numbered PNG frames from a video into `frames_dir` at the
    /// configured fps and width.
    async fn extract_frames(
        &self,
        input: &Path,
        frames_dir: &Path,
        settings: &EncodeSettings,
    ) -> ConversionResult<()>;

    /// Encodes an ordered frame sequence into a single GIF at `output`.
    async fn encode_gif(
        &self,
        frames: &[PathBuf],
        output: &Path,
        settings: &EncodeSettings,
    ) -> ConversionResult<()>;

    /// Resizes a still image to the configured width and writes it as PNG.
    async fn resize_still(
        &self,
        input: &Path,
        output: &Path,
        settings: &EncodeSettings,
    ) -> ConversionResult<()>;
}
