//! Media probing via ffprobe

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{ComposeError, Result};

/// What a probe learned about a local media file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    /// Container duration in seconds, `None` when unknown
    pub duration_secs: Option<f64>,
    pub has_video: bool,
    pub has_audio: bool,
}

impl MediaInfo {
    /// Sentinel for files that could not be parsed
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            duration_secs: None,
            has_video: false,
            has_audio: false,
        }
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.duration_secs.is_none() && !self.has_video && !self.has_audio
    }

    /// Duration if it is strictly positive, otherwise `InvalidMedia`
    pub fn require_positive_duration(&self, path: &Path) -> Result<f64> {
        match self.duration_secs {
            Some(d) if d.is_finite() && d > 0.0 => Ok(d),
            Some(d) => Err(ComposeError::invalid_media(
                path,
                format!("non-positive duration {d}"),
            )),
            None => Err(ComposeError::invalid_media(path, "duration unknown")),
        }
    }

    /// Still images have no meaningful duration; require a decodable picture
    pub fn require_picture(&self, path: &Path) -> Result<()> {
        if self.has_video {
            Ok(())
        } else {
            Err(ComposeError::invalid_media(path, "no decodable image stream"))
        }
    }
}

/// Reports properties of local media files
#[async_trait]
pub trait MediaProber: Send + Sync {
    /// Never fails: unparseable files yield [`MediaInfo::unknown`]
    async fn probe(&self, path: &Path) -> MediaInfo;
}

/// ffprobe-backed prober
pub struct FfprobeProber {
    ffprobe_path: String,
}

impl FfprobeProber {
    #[must_use]
    pub fn new(ffprobe_path: &str) -> Self {
        Self {
            ffprobe_path: ffprobe_path.to_string(),
        }
    }

    async fn run(&self, path: &Path) -> std::result::Result<MediaInfo, String> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| format!("cannot run {}: {e}", self.ffprobe_path))?;

        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }

        let probe: FfprobeOutput =
            serde_json::from_slice(&output.stdout).map_err(|e| e.to_string())?;
        Ok(probe.into_info())
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> MediaInfo {
        match self.run(path).await {
            Ok(info) => {
                debug!(?info, "Probed {}", path.display());
                info
            }
            Err(reason) => {
                warn!("Could not probe {}: {reason}", path.display());
                MediaInfo::unknown()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

impl FfprobeOutput {
    fn into_info(self) -> MediaInfo {
        let duration_secs = self
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite());

        let has = |kind: &str| {
            self.streams
                .iter()
                .any(|s| s.codec_type.as_deref() == Some(kind))
        };

        MediaInfo {
            duration_secs,
            has_video: has("video"),
            has_audio: has("audio"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn parse_ffprobe_json() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_type": "video", "width": 1920},
                {"index": 1, "codec_type": "audio", "channels": 2}
            ],
            "format": {"duration": "12.480000", "format_name": "mov,mp4"}
        }"#;
        let probe: FfprobeOutput = serde_json::from_str(json).unwrap();
        let info = probe.into_info();
        assert_eq!(info.duration_secs, Some(12.48));
        assert!(info.has_video);
        assert!(info.has_audio);
    }

    #[test]
    fn missing_duration_is_unknown() {
        let json = r#"{"streams": [{"codec_type": "video"}], "format": {"duration": "N/A"}}"#;
        let probe: FfprobeOutput = serde_json::from_str(json).unwrap();
        let info = probe.into_info();
        assert_eq!(info.duration_secs, None);
        assert!(info.require_picture(Path::new("a.jpg")).is_ok());
    }

    #[test]
    fn non_positive_duration_is_invalid_media() {
        let path = Path::new("clip.mp4");
        let zero = MediaInfo {
            duration_secs: Some(0.0),
            has_video: true,
            has_audio: true,
        };
        assert_eq!(
            zero.require_positive_duration(path).unwrap_err().kind(),
            ErrorKind::InvalidMedia
        );
        assert!(MediaInfo::unknown().require_positive_duration(path).is_err());
        assert!(MediaInfo::unknown().is_unknown());
    }

    #[tokio::test]
    async fn missing_binary_yields_unknown() {
        let prober = FfprobeProber::new("/nonexistent/ffprobe");
        let info = prober.probe(Path::new("whatever.mp4")).await;
        assert!(info.is_unknown());
    }
}
