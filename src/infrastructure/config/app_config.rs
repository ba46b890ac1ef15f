//! Application configuration.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use super::args::CliArgs;
use super::store::ConfigError;
use crate::domain::EncodeSettings;
use crate::infrastructure::cache::{
    DEFAULT_BUDGET_BYTES, DEFAULT_SWEEP_INTERVAL, SweeperConfig, WorkspaceRoot,
};
use crate::infrastructure::http::DownloaderConfig;
use crate::infrastructure::media::ToolsConfig;

const APP_NAME: &str = crate::NAME;
const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "linuxmobile";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration, from `config.toml` overlaid with CLI flags.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(skip)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Artifact cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Scratch workspace settings.
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Output encoding settings.
    #[serde(default)]
    pub conversion: ConversionConfig,

    /// External tool settings.
    #[serde(default)]
    pub tools: ToolsSection,

    /// Download settings.
    #[serde(default)]
    pub http: HttpConfig,
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory; platform cache dir when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Eviction budget in bytes.
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,

    /// Seconds between sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Minimum artifact age before eviction; defaults to the interval.
    #[serde(default)]
    pub min_age_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_size_bytes: default_max_size_bytes(),
            sweep_interval_secs: default_sweep_interval_secs(),
            min_age_secs: None,
        }
    }
}

impl CacheConfig {
    /// Sweeper settings derived from this section.
    #[must_use]
    pub fn sweeper(&self) -> SweeperConfig {
        let interval = Duration::from_secs(self.sweep_interval_secs);
        SweeperConfig {
            budget_bytes: self.max_size_bytes,
            interval,
            min_age: self.min_age_secs.map_or(interval, Duration::from_secs),
        }
    }
}

/// `[workspace]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Root for per-conversion scratch directories; system temp when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl WorkspaceConfig {
    /// The configured workspace root.
    #[must_use]
    pub fn root(&self) -> WorkspaceRoot {
        self.dir
            .clone()
            .map_or_else(WorkspaceRoot::default_location, WorkspaceRoot::new)
    }
}

/// `[conversion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Output frame rate.
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Output width in pixels.
    #[serde(default = "default_width")]
    pub width: u32,

    /// GIF quality, 1-100.
    #[serde(default = "default_quality")]
    pub quality: u8,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            width: default_width(),
            quality: default_quality(),
        }
    }
}

impl ConversionConfig {
    /// Encoder settings derived from this section.
    #[must_use]
    pub const fn settings(&self) -> EncodeSettings {
        EncodeSettings {
            fps: self.fps,
            width: self.width,
            quality: self.quality,
        }
    }
}

/// `[tools]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsSection {
    /// Frame extractor executable.
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,

    /// GIF encoder executable.
    #[serde(default = "default_gifski")]
    pub gifski: PathBuf,

    /// Per-invocation timeout in seconds.
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            gifski: default_gifski(),
            timeout_secs: default_tool_timeout_secs(),
        }
    }
}

impl ToolsSection {
    /// Tool adapter settings derived from this section.
    #[must_use]
    pub fn tools(&self) -> ToolsConfig {
        ToolsConfig {
            ffmpeg: self.ffmpeg.clone(),
            gifski: self.gifski.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,

    /// Largest accepted download.
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: u64,

    /// Overrides the `User-Agent` header.
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
            max_download_bytes: default_max_download_bytes(),
            user_agent: None,
        }
    }
}

impl HttpConfig {
    /// Downloader settings derived from this section.
    #[must_use]
    pub fn downloader(&self) -> DownloaderConfig {
        let defaults = DownloaderConfig::default();
        DownloaderConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            max_bytes: self.max_download_bytes,
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
        }
    }
}

const fn default_max_size_bytes() -> u64 {
    DEFAULT_BUDGET_BYTES
}

const fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL.as_secs()
}

const fn default_fps() -> u32 {
    EncodeSettings::DEFAULT_FPS
}

const fn default_width() -> u32 {
    EncodeSettings::DEFAULT_WIDTH
}

const fn default_quality() -> u8 {
    EncodeSettings::DEFAULT_QUALITY
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_gifski() -> PathBuf {
    PathBuf::from("gifski")
}

const fn default_tool_timeout_secs() -> u64 {
    120
}

const fn default_http_timeout_secs() -> u64 {
    30
}

const fn default_max_download_bytes() -> u64 {
    50 * 1024 * 1024
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(cache_dir) = &args.cache_dir {
            self.cache.dir = Some(cache_dir.clone());
        }
        if let Some(workspace_dir) = &args.workspace_dir {
            self.workspace.dir = Some(workspace_dir.clone());
        }
    }

    /// Rejects settings no conversion could honor.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.conversion.fps == 0 {
            return Err(ConfigError::invalid("conversion.fps must be positive"));
        }
        if self.conversion.width == 0 {
            return Err(ConfigError::invalid("conversion.width must be positive"));
        }
        if !(1..=100).contains(&self.conversion.quality) {
            return Err(ConfigError::invalid("conversion.quality must be 1-100"));
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(ConfigError::invalid("cache.sweep_interval_secs must be positive"));
        }
        if self.tools.timeout_secs == 0 {
            return Err(ConfigError::invalid("tools.timeout_secs must be positive"));
        }
        Ok(())
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join(format!("{APP_NAME}.log")))
    }

    /// Returns default artifact cache directory.
    #[must_use]
    pub fn default_cache_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.cache_dir().join("stickers"))
    }

    /// Returns effective config path.
    #[must_use]
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Self::default_config_path)
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }

    /// Returns effective cache directory.
    #[must_use]
    pub fn effective_cache_dir(&self) -> Option<PathBuf> {
        self.cache.dir.clone().or_else(Self::default_cache_dir)
    }
}
