//! `ffmpeg` / `gifski` subprocess adapter and in-process still resizing.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use image::imageops::FilterType;
use image::{ImageFormat, ImageReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::ports::MediaToolsPort;
use crate::domain::{ConversionError, ConversionResult, EncodeSettings};

/// Lines of stderr kept in failure messages.
const STDERR_TAIL_LINES: usize = 5;

/// Locations and limits of the external tools.
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    /// Frame extractor executable.
    pub ffmpeg: PathBuf,
    /// GIF encoder executable.
    pub gifski: PathBuf,
    /// Per-invocation wall-clock limit.
    pub timeout: Duration,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            gifski: PathBuf::from("gifski"),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Media toolchain backed by external processes.
#[derive(Debug, Clone, Default)]
pub struct ExternalMediaTools {
    config: ToolsConfig,
}

impl ExternalMediaTools {
    /// Creates the adapter.
    #[must_use]
    pub const fn new(config: ToolsConfig) -> Self {
        Self { config }
    }

    /// Returns the configured tools.
    #[must_use]
    pub const fn config(&self) -> &ToolsConfig {
        &self.config
    }
}

/// Arguments for extracting PNG frames with `ffmpeg`.
#[must_use]
pub fn ffmpeg_args(input: &Path, frames_dir: &Path, settings: &EncodeSettings) -> Vec<OsString> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-nostdin".into(),
        "-y".into(),
        "-i".into(),
        input.into(),
        "-vf".into(),
        format!(
            "fps={},scale={}:-1:flags=lanczos",
            settings.fps, settings.width
        )
        .into(),
        frames_dir.join("frame_%05d.png").into(),
    ]
}

/// Arguments for encoding `frames` with `gifski`.
#[must_use]
pub fn gifski_args(frames: &[PathBuf], output: &Path, settings: &EncodeSettings) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--quiet".into(),
        "--fps".into(),
        settings.fps.to_string().into(),
        "--width".into(),
        settings.width.to_string().into(),
        "--quality".into(),
        settings.quality.to_string().into(),
        "-o".into(),
        output.into(),
    ];
    args.extend(frames.iter().map(OsString::from));
    args
}

/// Runs `program` to completion within `limit`.
///
/// The child is killed if the limit expires or the future is dropped.
///
/// # Errors
/// Returns `ExternalToolFailure` if the program cannot start, exits
/// non-zero, or times out (message starts with `timed out`).
pub async fn run_tool(
    tool: &str,
    program: &Path,
    args: &[OsString],
    limit: Duration,
) -> ConversionResult<()> {
    let started = Instant::now();
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            ConversionError::tool(tool, format!("failed to start {}: {e}", program.display()))
        })?;

    let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(result) => {
            result.map_err(|e| ConversionError::tool(tool, format!("failed to wait: {e}")))?
        }
        Err(_) => {
            warn!(tool, timeout_secs = limit.as_secs_f64(), "Tool timed out");
            return Err(ConversionError::tool(
                tool,
                format!("timed out after {}s", limit.as_secs_f64()),
            ));
        }
    };

    debug!(
        tool,
        status = %output.status,
        elapsed_ms = started.elapsed().as_millis(),
        "Tool finished"
    );

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let tail = stderr_tail(&stderr);
    Err(ConversionError::tool(
        tool,
        if tail.is_empty() {
            format!("exited with {}", output.status)
        } else {
            format!("exited with {}: {tail}", output.status)
        },
    ))
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}

/// Height that keeps the aspect ratio at `width`.
#[must_use]
pub fn scaled_height(source_width: u32, source_height: u32, width: u32) -> u32 {
    let source_width = u64::from(source_width.max(1));
    let scaled = (u64::from(source_height) * u64::from(width) + source_width / 2) / source_width;
    u32::try_from(scaled.max(1)).unwrap_or(u32::MAX)
}

fn resize_to_png(input: &Path, output: &Path, width: u32) -> ConversionResult<(u32, u32)> {
    let image = ImageReader::open(input)
        .map_err(|e| ConversionError::decode(format!("{}: {e}", input.display())))?
        .with_guessed_format()
        .map_err(|e| ConversionError::decode(format!("{}: {e}", input.display())))?
        .decode()
        .map_err(|e| ConversionError::decode(format!("{}: {e}", input.display())))?;

    let height = scaled_height(image.width(), image.height(), width);
    image
        .resize_exact(width, height, FilterType::Lanczos3)
        .save_with_format(output, ImageFormat::Png)
        .map_err(|e| ConversionError::render(format!("{}: {e}", output.display())))?;

    Ok((width, height))
}

#[async_trait]
impl MediaToolsPort for ExternalMediaTools {
    async fn extract_frames(
        &self,
        input: &Path,
        frames_dir: &Path,
        settings: &EncodeSettings,
    ) -> ConversionResult<()> {
        let args = ffmpeg_args(input, frames_dir, settings);
        run_tool("ffmpeg", &self.config.ffmpeg, &args, self.config.timeout).await
    }

    async fn encode_gif(
        &self,
        frames: &[PathBuf],
        output: &Path,
        settings: &EncodeSettings,
    ) -> ConversionResult<()> {
        if frames.is_empty() {
            return Err(ConversionError::tool("gifski", "no frames to encode"));
        }
        let args = gifski_args(frames, output, settings);
        run_tool("gifski", &self.config.gifski, &args, self.config.timeout).await
    }

    async fn resize_still(
        &self,
        input: &Path,
        output: &Path,
        settings: &EncodeSettings,
    ) -> ConversionResult<()> {
        let (input, output, width) = (input.to_path_buf(), output.to_path_buf(), settings.width);
        let (w, h) = tokio::task::spawn_blocking(move || resize_to_png(&input, &output, width))
            .await
            .map_err(|e| ConversionError::render(format!("resize task failed: {e}")))??;

        debug!(width = w, height = h, "Resized still image");
        Ok(())
    }
}
