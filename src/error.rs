//! Error taxonomy for composition jobs

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Composition pipeline errors
#[derive(Error, Debug)]
pub enum ComposeError {
    /// Remote asset unreachable, non-success status, or truncated body
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Probed duration non-positive or unparseable
    #[error("invalid media {path}: {reason}")]
    InvalidMedia { path: String, reason: String },

    /// Command graph cannot be constructed for the job
    #[error("cannot build command graph: {0}")]
    Build(String),

    /// Transcoder exited unsuccessfully (`code` is `None` when killed)
    #[error("{program} failed ({}): {tail}", describe_code(.code))]
    Transcode {
        program: String,
        code: Option<i32>,
        tail: String,
    },

    /// Captioning sub-stage produced no usable subtitle document
    #[error("captioning failed: {0}")]
    Captioning(String),

    /// Callback delivery failed
    #[error("webhook delivery to {endpoint} failed: {reason}")]
    Notify { endpoint: String, reason: String },

    /// Malformed inbound request
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ComposeError>;

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated without exit code".to_string(),
    }
}

/// Machine-readable error category reported back to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Fetch,
    InvalidMedia,
    Build,
    Transcode,
    Captioning,
    Notify,
    Validation,
    Io,
}

impl ComposeError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Fetch { .. } => ErrorKind::Fetch,
            Self::InvalidMedia { .. } => ErrorKind::InvalidMedia,
            Self::Build(_) => ErrorKind::Build,
            Self::Transcode { .. } => ErrorKind::Transcode,
            Self::Captioning(_) => ErrorKind::Captioning,
            Self::Notify { .. } => ErrorKind::Notify,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Io(_) | Self::Json(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn fetch(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid_media(path: &std::path::Path, reason: impl Into<String>) -> Self {
        Self::InvalidMedia {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn notify(endpoint: &str, reason: impl std::fmt::Display) -> Self {
        Self::Notify {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }
}
