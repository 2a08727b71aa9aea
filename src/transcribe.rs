//! Caption generation backends
//!
//! A [`Transcriber`] turns a finished video into an SRT document at a given
//! path. Two backends exist: a request/response service that writes the file
//! itself, and the local `whisper` CLI.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::config::{TranscriptionBackend, TranscriptionConfig};
use crate::error::{ComposeError, Result};

/// Produces a caption document for a local video
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Write SRT captions for `video` to `dest`
    async fn transcribe(&self, video: &Path, dest: &Path) -> Result<()>;
}

/// Build the backend selected in configuration
pub fn from_config(
    config: &TranscriptionConfig,
    timeout: Duration,
) -> Result<Arc<dyn Transcriber>> {
    Ok(match config.backend {
        TranscriptionBackend::Http => Arc::new(HttpTranscriber::new(&config.endpoint, timeout)?),
        TranscriptionBackend::Whisper => {
            Arc::new(WhisperTranscriber::new(&config.whisper_path, &config.model))
        }
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TranscriptionRequest<'a> {
    video_path: &'a Path,
    subtitle_path: &'a Path,
}

/// Transcription service reached over HTTP.
///
/// The service shares the filesystem with this process: it reads
/// `videoPath` and writes `subtitlePath`.
pub struct HttpTranscriber {
    client: Client,
    endpoint: String,
}

impl HttpTranscriber {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| ComposeError::Captioning(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn transcribe(&self, video: &Path, dest: &Path) -> Result<()> {
        let body = TranscriptionRequest {
            video_path: video,
            subtitle_path: dest,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ComposeError::Captioning(format!("transcription request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ComposeError::Captioning(format!(
                "transcription service returned {status}: {}",
                detail.trim()
            )));
        }

        info!("Transcription service wrote {}", dest.display());
        Ok(())
    }
}

/// Local `whisper` CLI (openai-whisper)
pub struct WhisperTranscriber {
    whisper_path: String,
    model: String,
}

impl WhisperTranscriber {
    #[must_use]
    pub fn new(whisper_path: &str, model: &str) -> Self {
        Self {
            whisper_path: whisper_path.to_string(),
            model: model.to_string(),
        }
    }

    /// File whisper writes for `video` inside `dir`
    fn output_for(video: &Path, dir: &Path) -> PathBuf {
        let stem = video
            .file_stem()
            .map_or_else(|| "captions".into(), |s| s.to_string_lossy());
        dir.join(format!("{stem}.srt"))
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, video: &Path, dest: &Path) -> Result<()> {
        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        debug!("Running {} on {}", self.whisper_path, video.display());

        let output = Command::new(&self.whisper_path)
            .arg(video)
            .args(["--model", &self.model, "--output_format", "srt", "--output_dir"])
            .arg(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ComposeError::Captioning(format!("cannot start whisper: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ComposeError::Captioning(format!(
                "whisper failed: {}",
                stderr.trim()
            )));
        }

        let produced = Self::output_for(video, dir);
        if produced != dest {
            tokio::fs::rename(&produced, dest).await.map_err(|e| {
                ComposeError::Captioning(format!(
                    "whisper output {} missing: {e}",
                    produced.display()
                ))
            })?;
        }

        info!("Whisper wrote {}", dest.display());
        Ok(())
    }
}
