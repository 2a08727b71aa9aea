//! `vidweave` - media composition pipeline
//!
//! # Features
//!
//! - **Asset fetching**: concurrent streaming downloads into per-job workspaces
//! - **Probing**: ffprobe-backed duration and stream checks
//! - **Composition**: audio-video merge, clip concatenation, image zoom sequences
//! - **Captions**: generated subtitles reflowed to short lines and burned in
//! - **Delivery**: `{id, url}` webhook once the artifact is served
//!
//! # Example
//!
//! ```rust,no_run
//! use vidweave::{CompositionRequest, Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let orchestrator = Orchestrator::from_config(Config::load(None)?)?;
//!     let request = CompositionRequest::from_json(&std::fs::read_to_string("job.json")?)?;
//!     let job = orchestrator.accept(request)?;
//!     let result = orchestrator.run(job).await;
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```

pub mod compose;
pub mod config;
pub mod error;
pub mod fetch;
pub mod job;
pub mod notify;
pub mod orchestrator;
pub mod probe;
pub mod record;
pub mod subtitle;
pub mod transcode;
pub mod transcribe;
pub mod workspace;

pub use compose::{CommandBuilder, CommandGraph, TranscodeCommand};
pub use config::Config;
pub use error::{ComposeError, ErrorKind, Result};
pub use fetch::{AssetFetcher, HttpFetcher};
pub use job::{
    AssetDescriptor, AssetRole, CompositionJob, CompositionMode, CompositionRequest,
    CompositionResult, JobState,
};
pub use notify::{CallbackPayload, Notifier, WebhookNotifier};
pub use orchestrator::Orchestrator;
pub use probe::{FfprobeProber, MediaInfo, MediaProber};
pub use record::{AssetRef, HttpRecordLookup, MediaRecord, RecordLookup};
pub use subtitle::{SubtitleDocument, SubtitleEntry};
pub use transcode::{FfmpegTranscoder, Transcoder};
pub use transcribe::{HttpTranscriber, Transcriber, WhisperTranscriber};
pub use workspace::Workspace;

/// Version of vidweave
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
