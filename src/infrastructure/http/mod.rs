//! Network access for source assets.

pub mod downloader;

pub use downloader::{DownloaderConfig, HttpDownloader};
