//! Stickerconv - sticker conversion with a content-addressed artifact cache.
//!
//! This crate turns chat stickers (WEBM video, TGS vector animation and
//! still images) into GIF or PNG artifacts suitable for re-upload, caching
//! each result under a key derived from the sticker's stable identity.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the conversion use cases.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing adapters for the filesystem, network and tools.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "stickerconv";
