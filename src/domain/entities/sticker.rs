//! Sticker conversion request value objects.

use std::fmt;

/// Source format of a sticker, inferred from its download URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StickerKind {
    /// Still raster image (png, jpg, webp, ...).
    Static,
    /// WEBM video sticker.
    Webm,
    /// Gzipped Lottie vector animation.
    Tgs,
}

impl StickerKind {
    /// Infers the sticker kind from the file extension of a URL.
    ///
    /// The query string and fragment are ignored, as are letter case and
    /// trailing slashes. Anything that is not `.webm` or `.tgs` is treated as
    /// a still image.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        match url_extension(url).as_deref() {
            Some("webm") => Self::Webm,
            Some("tgs") => Self::Tgs,
            _ => Self::Static,
        }
    }

    /// Returns a short label used for workspace names and log fields.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Webm => "webm",
            Self::Tgs => "tgs",
        }
    }
}

impl fmt::Display for StickerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A request to convert one remote sticker asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    source_url: String,
    stable_id: Option<String>,
    kind: StickerKind,
}

impl ConversionRequest {
    /// Creates a request, inferring the kind from the URL.
    ///
    /// A blank stable identifier is treated as absent; any other identifier
    /// is kept byte for byte.
    #[must_use]
    pub fn new(source_url: impl Into<String>, stable_id: Option<&str>) -> Self {
        let source_url = source_url.into();
        let kind = StickerKind::from_url(&source_url);
        let stable_id = stable_id
            .filter(|id| !id.trim().is_empty())
            .map(String::from);

        Self {
            source_url,
            stable_id,
            kind,
        }
    }

    /// Returns the download URL.
    #[must_use]
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Returns the provider-assigned stable identifier, if any.
    #[must_use]
    pub fn stable_id(&self) -> Option<&str> {
        self.stable_id.as_deref()
    }

    /// Returns the inferred sticker kind.
    #[must_use]
    pub const fn kind(&self) -> StickerKind {
        self.kind
    }

    /// Returns the identifier the cache key is derived from.
    ///
    /// Source URLs expire and rotate, so the stable identifier wins when present.
    #[must_use]
    pub fn cache_identity(&self) -> &str {
        self.stable_id.as_deref().unwrap_or(&self.source_url)
    }
}

/// Returns the lowercase file extension of the last path segment of a URL.
#[must_use]
pub fn url_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path.trim_end_matches('/');

    let after_scheme = path.split_once("://").map_or(path, |(_, rest)| rest);
    let segment = after_scheme.rsplit('/').next()?;
    if segment == after_scheme && path.contains("://") {
        // Bare host, no path segment.
        return None;
    }

    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
