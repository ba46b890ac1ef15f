//! Infrastructure layer with adapters for the filesystem, network and tools.

/// Artifact cache, workspaces, leases and eviction.
pub mod cache;
/// Application configuration.
pub mod config;
/// HTTP downloads.
pub mod http;
/// Lottie decoding and rasterization.
pub mod lottie;
/// External media tools.
pub mod media;

pub use cache::{
    ArtifactLease, ArtifactLeases, CacheEvictionSweeper, CacheStats, ContentAddressedCache,
    InFlightRegistry, SweepReport, SweepState, SweeperConfig, Workspace, WorkspaceRoot,
};
pub use config::{AppConfig, CliArgs, Command, ConfigError, ConfigStore, LogLevel};
pub use http::{DownloaderConfig, HttpDownloader};
pub use media::{ExternalMediaTools, ToolsConfig};
