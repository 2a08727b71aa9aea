//! Service configuration loaded from `~/.config/vidweave/config.toml`.
//!
//! Every key is optional; a missing file yields [`Config::default`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ComposeError, Result};

/// Default seconds each still image stays on screen
pub const DEFAULT_PER_IMAGE_SECS: f64 = 5.0;

/// Default caption words per displayed line
pub const DEFAULT_MAX_WORDS_PER_LINE: usize = 3;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Public base address under which `output_dir` is served
    pub public_base_url: String,
    /// Route segment between the base address and the artifact filename
    pub artifact_route: String,
    /// Directory the artifact host serves finished files from
    pub output_dir: PathBuf,
    /// Parent directory for per-job workspaces
    pub work_root: PathBuf,
    /// Path to ffmpeg binary
    pub ffmpeg_path: String,
    /// Path to ffprobe binary
    pub ffprobe_path: String,
    /// Kill a transcoding subprocess after this many seconds
    pub transcode_timeout_secs: Option<u64>,
    /// Per-image hold time when a request does not specify one
    pub per_image_secs: f64,
    /// Caption reflow threshold
    pub max_words_per_line: usize,
    /// Timeout for webhook, record and transcription requests; also the
    /// longest an asset download may wait for its next bytes
    pub http_timeout_secs: u64,
    /// Captioning backend
    pub transcription: TranscriptionConfig,
    /// Record lookup API (only needed for record-driven merges)
    pub record_lookup: Option<RecordLookupConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:3003".to_string(),
            artifact_route: "videos".to_string(),
            output_dir: PathBuf::from("Final"),
            work_root: std::env::temp_dir().join("vidweave"),
            ffmpeg_path: find_binary("ffmpeg"),
            ffprobe_path: find_binary("ffprobe"),
            transcode_timeout_secs: None,
            per_image_secs: DEFAULT_PER_IMAGE_SECS,
            max_words_per_line: DEFAULT_MAX_WORDS_PER_LINE,
            http_timeout_secs: 60,
            transcription: TranscriptionConfig::default(),
            record_lookup: None,
        }
    }
}

/// Which service produces caption documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionBackend {
    /// Remote request/response transcription service
    #[default]
    Http,
    /// Local `whisper` CLI
    Whisper,
}

/// Transcription settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub backend: TranscriptionBackend,
    /// Endpoint for the HTTP backend
    pub endpoint: String,
    /// Path to whisper executable (or "whisper" for PATH lookup)
    pub whisper_path: String,
    /// Whisper model size (tiny, base, small, medium, large)
    pub model: String,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            backend: TranscriptionBackend::Http,
            endpoint: "http://localhost:5000/process".to_string(),
            whisper_path: "whisper".to_string(),
            model: "base".to_string(),
        }
    }
}

/// Record lookup API settings
#[derive(Debug, Clone, Deserialize)]
pub struct RecordLookupConfig {
    /// Collection URL; records live at `<base_url>/<record_id>`
    pub base_url: String,
    /// Bearer token
    pub token: String,
    #[serde(default = "default_video_field")]
    pub video_field: String,
    #[serde(default = "default_audio_field")]
    pub audio_field: String,
}

fn default_video_field() -> String {
    "Video".to_string()
}

fn default_audio_field() -> String {
    "Audio".to_string()
}

impl Config {
    /// Load configuration from `path`, or from the default location when `None`.
    ///
    /// A missing file at the default location is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_path(), false),
        };

        if !path.exists() {
            if required {
                return Err(ComposeError::Validation(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        Self::from_toml(&content)
            .map_err(|e| ComposeError::Validation(format!("invalid TOML in {}: {e}", path.display())))
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Override the public base URL (e.g. from a CLI flag)
    #[must_use]
    pub fn with_public_base_url(mut self, url: &str) -> Self {
        self.public_base_url = url.to_string();
        self
    }

    #[must_use]
    pub fn transcode_timeout(&self) -> Option<Duration> {
        self.transcode_timeout_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Externally reachable URL for an artifact filename
    #[must_use]
    pub fn artifact_url(&self, filename: &str) -> String {
        let base = self.public_base_url.trim_end_matches('/');
        let route = self.artifact_route.trim_matches('/');
        if route.is_empty() {
            format!("{base}/{filename}")
        } else {
            format!("{base}/{route}/{filename}")
        }
    }
}

/// Return the path to the default config file.
fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vidweave")
        .join("config.toml")
}

fn find_binary(name: &str) -> String {
    which::which(name).map_or_else(|_| name.to_string(), |p| p.to_string_lossy().to_string())
}
