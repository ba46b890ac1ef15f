//! Application configuration.

pub mod app_config;
pub mod args;
pub mod store;

pub use app_config::{
    AppConfig, CacheConfig, ConversionConfig, HttpConfig, LogLevel, ToolsSection, WorkspaceConfig,
};
pub use args::{CliArgs, Command};
pub use store::{ConfigError, ConfigStore};
