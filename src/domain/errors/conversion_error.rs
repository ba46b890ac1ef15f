//! Conversion error types.

use thiserror::Error;

/// Result type for conversion operations.
pub type ConversionResult<T> = Result<T, ConversionError>;

/// Conversion error variants.
///
/// Errors are `Clone` so a single conversion result can be handed to every
/// caller waiting on the same cache key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum ConversionError {
    #[error("failed to download {url}: {message}")]
    DownloadFailure { url: String, message: String },

    #[error("failed to decode source asset: {message}")]
    DecodeFailure { message: String },

    #[error("failed to render animation: {message}")]
    RenderFailure { message: String },

    #[error("{tool} failed: {message}")]
    ExternalToolFailure { tool: String, message: String },

    #[error("failed to write cache artifact: {message}")]
    CacheWriteFailure { message: String },

    #[error("failed to prepare workspace: {message}")]
    WorkspaceFailure { message: String },

    #[error("conversion for {key} ended without a result")]
    ConversionAbandoned { key: String },
}

impl ConversionError {
    /// Creates download failure.
    #[must_use]
    pub fn download(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DownloadFailure {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates decode failure.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::DecodeFailure {
            message: message.into(),
        }
    }

    /// Creates render failure.
    #[must_use]
    pub fn render(message: impl Into<String>) -> Self {
        Self::RenderFailure {
            message: message.into(),
        }
    }

    /// Creates external tool failure.
    #[must_use]
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalToolFailure {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Creates cache write failure.
    #[must_use]
    pub fn cache_write(message: impl Into<String>) -> Self {
        Self::CacheWriteFailure {
            message: message.into(),
        }
    }

    /// Creates workspace failure.
    #[must_use]
    pub fn workspace(message: impl Into<String>) -> Self {
        Self::WorkspaceFailure {
            message: message.into(),
        }
    }

    /// Creates abandoned conversion error.
    #[must_use]
    pub fn abandoned(key: impl Into<String>) -> Self {
        Self::ConversionAbandoned { key: key.into() }
    }

    /// Returns a stable label for log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DownloadFailure { .. } => "download",
            Self::DecodeFailure { .. } => "decode",
            Self::RenderFailure { .. } => "render",
            Self::ExternalToolFailure { .. } => "external_tool",
            Self::CacheWriteFailure { .. } => "cache_write",
            Self::WorkspaceFailure { .. } => "workspace",
            Self::ConversionAbandoned { .. } => "abandoned",
        }
    }

    /// Returns whether a caller-side retry could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::DownloadFailure { .. } | Self::ConversionAbandoned { .. } => true,
            Self::ExternalToolFailure { message, .. } => message.starts_with("timed out"),
            _ => false,
        }
    }
}
