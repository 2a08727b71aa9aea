//! Remote asset download into a job workspace

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use crate::error::{ComposeError, Result};

/// Retrieves one remote asset into a local file
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Download `url` to `dest`, creating exactly that one file.
    ///
    /// Fails when `dest` already exists; never leaves a partial file behind.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Streaming HTTP fetcher
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// `read_timeout` bounds each wait for bytes, not the whole download,
    /// so large assets from a live server still complete.
    pub fn new(read_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(4)
            .tcp_keepalive(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(read_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .use_rustls_tls()
            .build()
            .map_err(|e| ComposeError::Validation(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Use an existing client (shares its connection pool)
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn stream_to(&self, url: &str, file: &mut File) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ComposeError::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ComposeError::fetch(url, format!("HTTP {status}")));
        }

        let expected = response.content_length();
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ComposeError::fetch(url, format!("stream interrupted: {e}")))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;

        if let Some(expected) = expected {
            if written != expected {
                return Err(ComposeError::fetch(
                    url,
                    format!("incomplete body: {written} of {expected} bytes"),
                ));
            }
        }

        Ok(written)
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    #[instrument(skip(self, dest), fields(url = %url))]
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        debug!("Downloading to {}", dest.display());

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dest)
            .await
            .map_err(|e| ComposeError::fetch(url, format!("cannot create {}: {e}", dest.display())))?;

        let result = self.stream_to(url, &mut file).await;
        drop(file);

        match result {
            Ok(bytes) => {
                info!(bytes, "Downloaded {}", dest.display());
                Ok(bytes)
            }
            Err(e) => {
                let _ = fs::remove_file(dest).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn unreachable_host_is_fetch_error_and_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("video_0.mp4");
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();

        // Port 9 (discard) on loopback refuses connections on test hosts.
        let err = fetcher
            .fetch("http://127.0.0.1:9/clip.mp4", &dest)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Fetch);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn existing_destination_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("image_0.jpg");
        fs::write(&dest, b"keep").await.unwrap();

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher
            .fetch("http://127.0.0.1:9/a.jpg", &dest)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Fetch);
        assert_eq!(fs::read(&dest).await.unwrap(), b"keep");
    }
}
