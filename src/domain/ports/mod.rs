mod downloader_port;
mod media_tools_port;

pub use downloader_port::DownloaderPort;
pub use media_tools_port::MediaToolsPort;
