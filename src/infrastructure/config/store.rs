//! TOML configuration file on disk.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::app_config::AppConfig;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ConfigError {
    #[error("no platform config directory; pass --config")]
    NoConfigLocation,
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode config: {0}")]
    Encode(#[from] toml::ser::Error),
}

impl ConfigError {
    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The config file backing an [`AppConfig`].
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Uses `path` when given, else the platform default location.
    ///
    /// # Errors
    /// Returns `NoConfigLocation` if no path is given and the platform has
    /// no config directory.
    pub fn locate(path: Option<&Path>) -> Result<Self, ConfigError> {
        path.map(Path::to_path_buf)
            .or_else(AppConfig::default_config_path)
            .map(Self::at)
            .ok_or(ConfigError::NoConfigLocation)
    }

    /// Uses the file at `path`.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the configuration.
    ///
    /// A missing file is written with defaults first. A file that does not
    /// parse is left alone and defaults are returned.
    ///
    /// # Errors
    /// Returns `Io` if the file cannot be read or the defaults cannot be
    /// written.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "Writing default configuration");
                let defaults = AppConfig::default();
                self.write(&defaults)?;
                return Ok(defaults);
            }
            Err(e) => return Err(ConfigError::io(&self.path, e)),
        };

        toml::from_str(&text).or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Unreadable configuration, using defaults");
            Ok(AppConfig::default())
        })
    }

    /// Replaces the file with `config`, never leaving a partial file behind.
    ///
    /// # Errors
    /// Returns `Encode` if the config cannot be serialized or `Io` if the
    /// file cannot be written.
    pub fn write(&self, config: &AppConfig) -> Result<(), ConfigError> {
        let encoded = toml::to_string_pretty(config)?;
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| ConfigError::io(dir, e))?;

        let mut staged =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| ConfigError::io(dir, e))?;
        staged
            .write_all(encoded.as_bytes())
            .map_err(|e| ConfigError::io(staged.path(), e))?;
        staged
            .persist(&self.path)
            .map_err(|e| ConfigError::io(&self.path, e.error))?;

        debug!(path = %self.path.display(), "Saved configuration");
        Ok(())
    }
}
