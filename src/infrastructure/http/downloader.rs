//! HTTP implementation of the downloader port.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use crate::domain::ports::DownloaderPort;
use crate::domain::{ConversionError, ConversionResult};

/// Settings for [`HttpDownloader`].
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Whole-request timeout.
    pub timeout: Duration,
    /// Largest accepted body; larger downloads fail.
    pub max_bytes: u64,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_bytes: 50 * 1024 * 1024,
            user_agent: format!("{}/{}", crate::NAME, crate::VERSION),
        }
    }
}

/// Streams remote assets to disk with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
    max_bytes: u64,
}

impl HttpDownloader {
    /// Creates a downloader.
    ///
    /// # Errors
    /// Returns `DownloadFailure` if the HTTP client cannot be built.
    pub fn new(config: &DownloaderConfig) -> ConversionResult<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                ConversionError::download("", format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }

    async fn fetch(&self, url: &str, destination: &Path) -> ConversionResult<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ConversionError::download(url, format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConversionError::download(
                url,
                format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                ),
            ));
        }

        if let Some(length) = response.content_length()
            && length > self.max_bytes
        {
            return Err(ConversionError::download(
                url,
                format!("body of {length} bytes exceeds limit of {}", self.max_bytes),
            ));
        }

        let mut file = File::create(destination).await.map_err(|e| {
            ConversionError::download(
                url,
                format!("Failed to create {}: {e}", destination.display()),
            )
        })?;

        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ConversionError::download(url, format!("Failed to read body: {e}")))?
        {
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(ConversionError::download(
                    url,
                    format!("body exceeds limit of {} bytes", self.max_bytes),
                ));
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| ConversionError::download(url, format!("Failed to write body: {e}")))?;
            trace!(url, written, "Received chunk");
        }

        file.flush()
            .await
            .map_err(|e| ConversionError::download(url, format!("Failed to flush body: {e}")))?;

        Ok(written)
    }
}

#[async_trait]
impl DownloaderPort for HttpDownloader {
    async fn download(&self, url: &str, destination: &Path) -> ConversionResult<u64> {
        debug!(url, destination = %destination.display(), "Downloading");

        match self.fetch(url, destination).await {
            Ok(bytes) => {
                debug!(url, bytes, "Download complete");
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(destination).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serves one canned HTTP response on a random local port.
    async fn serve_once(status: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{addr}/sticker.webm")
    }

    fn downloader(max_bytes: u64) -> HttpDownloader {
        HttpDownloader::new(&DownloaderConfig {
            timeout: Duration::from_secs(5),
            max_bytes,
            ..DownloaderConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_download_writes_body() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("source.webm");
        let url = serve_once("200 OK", b"webm-bytes".to_vec()).await;

        let written = downloader(1024).download(&url, &dest).await.unwrap();

        assert_eq!(written, 10);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"webm-bytes");
    }

    #[tokio::test]
    async fn test_http_error_status_is_download_failure() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("source.webm");
        let url = serve_once("404 Not Found", Vec::new()).await;

        let err = downloader(1024).download(&url, &dest).await.unwrap_err();

        match err {
            ConversionError::DownloadFailure { url: failed, message } => {
                assert_eq!(failed, url);
                assert!(message.contains("404"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("source.webm");
        let url = serve_once("200 OK", vec![7u8; 64]).await;

        let err = downloader(16).download(&url, &dest).await.unwrap_err();

        assert!(matches!(err, ConversionError::DownloadFailure { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let err = downloader(1024)
            .download(&format!("http://{addr}/x.png"), &dir.path().join("x.png"))
            .await
            .unwrap_err();

        assert!(err.is_transient());
    }
}
