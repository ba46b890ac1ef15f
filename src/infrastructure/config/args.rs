use super::app_config::LogLevel;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "stickerconv",
    version,
    about = "Converts chat stickers (WEBM, TGS, still images) into cached GIF/PNG artifacts",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Artifact cache directory.
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Root for scratch workspaces.
    #[arg(long, value_name = "DIR")]
    pub workspace_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Converts one sticker and prints the artifact path.
    Convert {
        /// Source asset URL (.webm, .tgs, or a still image).
        url: String,

        /// Stable identifier used as the cache identity instead of the URL.
        #[arg(long, value_name = "ID")]
        stable_id: Option<String>,
    },
    /// Runs one eviction sweep and prints the report.
    Sweep,
    /// Runs the periodic sweeper until interrupted.
    Watch,
    /// Prints the artifact count and total size.
    Stats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_convert() {
        let args = CliArgs::parse_from([
            "stickerconv",
            "--workspace-dir",
            "/tmp/ws",
            "convert",
            "https://example/file.webm",
            "--stable-id",
            "abc123",
        ]);

        assert_eq!(args.workspace_dir, Some(PathBuf::from("/tmp/ws")));
        match args.command {
            Command::Convert { url, stable_id } => {
                assert_eq!(url, "https://example/file.webm");
                assert_eq!(stable_id.as_deref(), Some("abc123"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_subcommand_required() {
        assert!(CliArgs::try_parse_from(["stickerconv"]).is_err());
    }
}
