//! Inbound requests, validated jobs and terminal results

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ComposeError, ErrorKind, Result};

/// How the inputs of a job are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionMode {
    /// One video + one audio track, re-encoded, cut to the shorter one
    AudioVideo,
    /// N clips concatenated, then captions generated and burned in
    ClipConcat,
    /// N still images with a zoom effect, concatenated into a silent video
    ImageSequence,
}

/// Role of an input asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetRole {
    Video,
    Audio,
    Image,
}

impl AssetRole {
    /// File stem prefix used inside the workspace
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Image => "image",
        }
    }
}

/// One input asset as described by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetDescriptor {
    #[serde(alias = "url")]
    pub src: String,
    #[serde(default)]
    pub role: Option<AssetRole>,
    /// Ordering key for clip concatenation
    #[serde(default, alias = "sceneId")]
    pub sequence: Option<i64>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl AssetDescriptor {
    #[must_use]
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            role: None,
            sequence: None,
            width: None,
            height: None,
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: AssetRole) -> Self {
        self.role = Some(role);
        self
    }

    #[must_use]
    pub fn with_sequence(mut self, sequence: i64) -> Self {
        self.sequence = Some(sequence);
        self
    }
}

/// Structured trigger accepted by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionRequest {
    /// Caller-supplied record id
    #[serde(default, alias = "recordId")]
    pub id: String,
    pub mode: CompositionMode,
    #[serde(default, alias = "videos", alias = "images")]
    pub assets: Vec<AssetDescriptor>,
    #[serde(default)]
    pub fps: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// Fixed per-item duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default, alias = "webhookUrl")]
    pub callback_url: String,
}

impl CompositionRequest {
    /// Parse a request from JSON, mapping decode failures to validation errors
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| ComposeError::Validation(e.to_string()))
    }

    /// Check required fields and produce an immutable job.
    ///
    /// `default_per_image_secs` applies to image sequences without a `duration`.
    pub fn validate(self, default_per_image_secs: f64) -> Result<CompositionJob> {
        let id = self.id.trim().to_string();
        if id.is_empty() {
            return Err(invalid("missing job id"));
        }

        let callback_url = parse_http_url(&self.callback_url)
            .map_err(|e| invalid(format!("callback endpoint: {e}")))?;

        if self.assets.is_empty() {
            return Err(invalid("asset list is empty"));
        }

        let assets = self
            .assets
            .iter()
            .enumerate()
            .map(|(position, asset)| AssetSpec::from_descriptor(position, asset))
            .collect::<Result<Vec<_>>>()?;

        let mode = match self.mode {
            CompositionMode::AudioVideo => audio_video_pair(assets)?,
            CompositionMode::ClipConcat => JobMode::ClipConcat {
                clips: assets,
                frame: frame_spec(self.fps, self.width, self.height)?,
            },
            CompositionMode::ImageSequence => {
                let per_image_secs = self.duration.unwrap_or(default_per_image_secs);
                if !per_image_secs.is_finite() || per_image_secs <= 0.0 {
                    return Err(invalid("per-image duration must be positive"));
                }
                JobMode::ImageSequence {
                    images: assets,
                    frame: frame_spec(self.fps, self.width, self.height)?,
                    per_image_secs,
                }
            }
        };

        Ok(CompositionJob {
            id,
            mode,
            callback_url,
        })
    }
}

fn invalid(reason: impl Into<String>) -> ComposeError {
    ComposeError::Validation(reason.into())
}

fn parse_http_url(raw: &str) -> std::result::Result<Url, String> {
    if raw.trim().is_empty() {
        return Err("missing".to_string());
    }
    let url = Url::parse(raw.trim()).map_err(|e| format!("'{raw}' is not a URL: {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme '{other}'")),
    }
}

fn frame_spec(fps: Option<u32>, width: Option<u32>, height: Option<u32>) -> Result<FrameSpec> {
    match (fps, width, height) {
        (Some(fps), Some(width), Some(height)) if fps > 0 && width > 0 && height > 0 => {
            Ok(FrameSpec { fps, width, height })
        }
        _ => Err(invalid(
            "missing required parameters: width, height, or fps",
        )),
    }
}

fn audio_video_pair(assets: Vec<AssetSpec>) -> Result<JobMode> {
    if assets.len() != 2 {
        return Err(invalid(format!(
            "audio-video merge needs exactly 2 assets, got {}",
            assets.len()
        )));
    }

    let mut video = None;
    let mut audio = None;
    for (slot, asset) in assets.into_iter().enumerate() {
        let role = asset.role.unwrap_or(if slot == 0 {
            AssetRole::Video
        } else {
            AssetRole::Audio
        });
        let target = match role {
            AssetRole::Video => &mut video,
            AssetRole::Audio => &mut audio,
            AssetRole::Image => {
                return Err(invalid("audio-video merge does not take image assets"));
            }
        };
        if target.replace(asset).is_some() {
            return Err(invalid("audio-video merge needs one video and one audio asset"));
        }
    }

    match (video, audio) {
        (Some(video), Some(audio)) => Ok(JobMode::AudioVideo { video, audio }),
        _ => Err(invalid("missing video or audio asset")),
    }
}

/// Validated input asset
#[derive(Debug, Clone, PartialEq)]
pub struct AssetSpec {
    pub url: Url,
    /// Position in the request (tie-breaker for ordering)
    pub position: usize,
    pub sequence: Option<i64>,
    pub role: Option<AssetRole>,
    pub declared_size: Option<(u32, u32)>,
}

impl AssetSpec {
    fn from_descriptor(position: usize, asset: &AssetDescriptor) -> Result<Self> {
        let url = parse_http_url(&asset.src)
            .map_err(|e| invalid(format!("asset {position}: {e}")))?;
        Ok(Self {
            url,
            position,
            sequence: asset.sequence,
            role: asset.role,
            declared_size: asset.width.zip(asset.height),
        })
    }

    /// Extension of the URL path (without dot), if it has one
    #[must_use]
    pub fn url_extension(&self) -> Option<String> {
        let segment = self.url.path_segments()?.next_back()?;
        let (_, ext) = segment.rsplit_once('.')?;
        if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

/// Output frame parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSpec {
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

impl FrameSpec {
    /// `WxH` as used by ffmpeg size options
    #[must_use]
    pub fn size(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Mode-specific job data
#[derive(Debug, Clone, PartialEq)]
pub enum JobMode {
    AudioVideo {
        video: AssetSpec,
        audio: AssetSpec,
    },
    ClipConcat {
        clips: Vec<AssetSpec>,
        frame: FrameSpec,
    },
    ImageSequence {
        images: Vec<AssetSpec>,
        frame: FrameSpec,
        per_image_secs: f64,
    },
}

/// An accepted, immutable composition job
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionJob {
    id: String,
    mode: JobMode,
    callback_url: Url,
}

impl CompositionJob {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn mode(&self) -> &JobMode {
        &self.mode
    }

    #[must_use]
    pub fn callback_url(&self) -> &Url {
        &self.callback_url
    }

    #[must_use]
    pub fn composition_mode(&self) -> CompositionMode {
        match self.mode {
            JobMode::AudioVideo { .. } => CompositionMode::AudioVideo,
            JobMode::ClipConcat { .. } => CompositionMode::ClipConcat,
            JobMode::ImageSequence { .. } => CompositionMode::ImageSequence,
        }
    }

    /// Whether the job needs generated captions burned in
    #[must_use]
    pub fn requires_captions(&self) -> bool {
        matches!(self.mode, JobMode::ClipConcat { .. })
    }

    /// Id restricted to characters safe in file names
    #[must_use]
    pub fn file_safe_id(&self) -> String {
        sanitize_id(&self.id)
    }

    /// Name of the finished artifact; `suffix` distinguishes repeated runs
    #[must_use]
    pub fn artifact_filename(&self, suffix: i64) -> String {
        let id = self.file_safe_id();
        match self.mode {
            JobMode::AudioVideo { .. } => format!("merged_{id}.mp4"),
            _ => format!("output_{id}_{suffix}.mp4"),
        }
    }
}

/// Keep `[A-Za-z0-9_-]`, replace everything else with `_`
#[must_use]
pub fn sanitize_id(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "job".to_string()
    } else {
        cleaned
    }
}

/// States of the composition state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Fetching,
    Validating,
    Building,
    Transcoding,
    Captioning,
    Notifying,
    Done,
    Failed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Fetching => "fetching",
            Self::Validating => "validating",
            Self::Building => "building",
            Self::Transcoding => "transcoding",
            Self::Captioning => "captioning",
            Self::Notifying => "notifying",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Terminal outcome of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompositionResult {
    /// Artifact produced and webhook delivered
    Delivered {
        id: String,
        url: String,
        path: PathBuf,
    },
    /// Artifact produced, webhook delivery failed
    DeliveryFailed {
        id: String,
        url: String,
        path: PathBuf,
        reason: String,
    },
    /// Job aborted in `stage`; no webhook was sent
    Failed {
        id: String,
        stage: JobState,
        kind: ErrorKind,
        reason: String,
    },
}

impl CompositionResult {
    pub(crate) fn failed(id: &str, stage: JobState, err: &ComposeError) -> Self {
        Self::Failed {
            id: id.to_string(),
            stage,
            kind: err.kind(),
            reason: err.to_string(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Delivered { id, .. } | Self::DeliveryFailed { id, .. } | Self::Failed { id, .. } => id,
        }
    }

    /// Artifact URL, when one was produced
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Delivered { url, .. } | Self::DeliveryFailed { url, .. } => Some(url),
            Self::Failed { .. } => None,
        }
    }

    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            Self::DeliveryFailed { .. } => Some(ErrorKind::Notify),
            Self::Delivered { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_request() -> CompositionRequest {
        CompositionRequest::from_json(
            r#"{
                "recordId": "rec42",
                "mode": "image_sequence",
                "images": [
                    {"src": "https://cdn.example.com/a.png", "width": 1024, "height": 768},
                    {"src": "https://cdn.example.com/b"}
                ],
                "width": 640, "height": 480, "fps": 24,
                "webhookUrl": "https://hooks.example.com/done"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn image_request_accepts_original_field_names() {
        let job = image_request().validate(5.0).unwrap();
        assert_eq!(job.id(), "rec42");
        match job.mode() {
            JobMode::ImageSequence {
                images,
                frame,
                per_image_secs,
            } => {
                assert_eq!(images.len(), 2);
                assert_eq!(images[0].declared_size, Some((1024, 768)));
                assert_eq!(*frame, FrameSpec { fps: 24, width: 640, height: 480 });
                assert!((per_image_secs - 5.0).abs() < f64::EPSILON);
            }
            other => panic!("unexpected mode {other:?}"),
        }
        assert!(!job.requires_captions());
    }

    #[test]
    fn empty_asset_list_is_rejected() {
        let mut request = image_request();
        request.assets.clear();
        let err = request.validate(5.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("asset list is empty"));
    }

    #[test]
    fn missing_numeric_parameters_are_rejected() {
        let mut request = image_request();
        request.fps = None;
        assert!(request.validate(5.0).unwrap_err().to_string().contains("fps"));

        let mut request = image_request();
        request.width = Some(0);
        assert!(request.validate(5.0).is_err());
    }

    #[test]
    fn bad_urls_are_rejected() {
        let mut request = image_request();
        request.callback_url = "ftp://hooks.example.com".to_string();
        assert!(request.validate(5.0).is_err());

        let mut request = image_request();
        request.assets[1].src = "not a url".to_string();
        let err = request.validate(5.0).unwrap_err();
        assert!(err.to_string().contains("asset 1"));
    }

    #[test]
    fn audio_video_defaults_roles_by_position() {
        let request = CompositionRequest {
            id: "rec1".to_string(),
            mode: CompositionMode::AudioVideo,
            assets: vec![
                AssetDescriptor::new("https://cdn.example.com/v.mp4"),
                AssetDescriptor::new("https://cdn.example.com/a.mp3"),
            ],
            fps: None,
            width: None,
            height: None,
            duration: None,
            callback_url: "https://hooks.example.com".to_string(),
        };
        let job = request.validate(5.0).unwrap();
        match job.mode() {
            JobMode::AudioVideo { video, audio } => {
                assert!(video.url.as_str().ends_with("v.mp4"));
                assert!(audio.url.as_str().ends_with("a.mp3"));
            }
            other => panic!("unexpected mode {other:?}"),
        }
        assert_eq!(job.artifact_filename(1), "merged_rec1.mp4");
    }

    #[test]
    fn audio_video_rejects_two_videos() {
        let request = CompositionRequest {
            id: "rec1".to_string(),
            mode: CompositionMode::AudioVideo,
            assets: vec![
                AssetDescriptor::new("https://cdn.example.com/v.mp4").with_role(AssetRole::Video),
                AssetDescriptor::new("https://cdn.example.com/w.mp4").with_role(AssetRole::Video),
            ],
            fps: None,
            width: None,
            height: None,
            duration: None,
            callback_url: "https://hooks.example.com".to_string(),
        };
        assert_eq!(
            request.validate(5.0).unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn url_extension_from_path() {
        let job = image_request().validate(5.0).unwrap();
        let JobMode::ImageSequence { images, .. } = job.mode() else {
            panic!("expected image sequence");
        };
        assert_eq!(images[0].url_extension().as_deref(), Some("png"));
        assert_eq!(images[1].url_extension(), None);
    }

    #[test]
    fn sanitize_strips_path_characters() {
        assert_eq!(sanitize_id("../rec 1/x"), "___rec_1_x");
        assert_eq!(sanitize_id(""), "job");
    }

    #[test]
    fn artifact_filename_for_sequences_has_suffix() {
        let job = image_request().validate(5.0).unwrap();
        assert_eq!(job.artifact_filename(1700), "output_rec42_1700.mp4");
    }

    #[test]
    fn result_serializes_with_status_tag() {
        let result = CompositionResult::Delivered {
            id: "rec1".to_string(),
            url: "https://media.example.com/videos/x.mp4".to_string(),
            path: PathBuf::from("/srv/x.mp4"),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "delivered");
        assert_eq!(json["url"], "https://media.example.com/videos/x.mp4");
    }
}
