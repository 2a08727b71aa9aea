//! Composition orchestrator
//!
//! Drives one job through
//! `Created → Fetching → Validating → Building → Transcoding → [Captioning →
//! Transcoding] → Notifying → Done`, dropping to `Failed` from any stage.
//!
//! Every job gets its own [`Workspace`]; it is reclaimed on every exit path.
//! No webhook is sent for a failed job. A failed webhook after a successful
//! transcode yields [`CompositionResult::DeliveryFailed`], not a failure.
//!
//! ```no_run
//! use vidweave::{CompositionRequest, Config, Orchestrator};
//!
//! # async fn example() -> vidweave::Result<()> {
//! let orchestrator = Orchestrator::from_config(Config::load(None)?)?;
//! let request = CompositionRequest::from_json(r#"{
//!     "id": "rec1", "mode": "image_sequence",
//!     "assets": [{"src": "https://cdn.example.com/a.png"}],
//!     "fps": 24, "width": 1280, "height": 720,
//!     "callback_url": "https://hooks.example.com/done"
//! }"#)?;
//! let handle = orchestrator.submit(request)?;
//! let result = handle.await.expect("job task panicked");
//! println!("{}", serde_json::to_string(&result)?);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::compose::{ClipInput, CommandBuilder, CommandGraph, TimedInput};
use crate::config::Config;
use crate::error::{ComposeError, Result};
use crate::fetch::{AssetFetcher, HttpFetcher};
use crate::job::{
    AssetRole, AssetSpec, CompositionJob, CompositionRequest, CompositionResult, JobMode, JobState,
};
use crate::notify::{CallbackPayload, Notifier, WebhookNotifier};
use crate::probe::{FfprobeProber, MediaProber};
use crate::record::RecordLookup;
use crate::subtitle::SubtitleDocument;
use crate::transcode::{FfmpegTranscoder, Transcoder};
use crate::transcribe::{self, Transcriber};
use crate::workspace::{claim_destination, hand_off, Workspace};

/// Intermediate concatenation output when captions follow
const COMBINED_NAME: &str = "combined.mp4";
/// Caption document written by the transcription step
const SUBTITLES_NAME: &str = "subtitles.srt";

/// Artifact placed in the served output directory
#[derive(Debug)]
struct Artifact {
    filename: String,
    path: PathBuf,
}

/// Current state of one job, logged on every transition
struct StageTracker {
    job_id: String,
    state: JobState,
}

impl StageTracker {
    fn new(job_id: &str) -> Self {
        info!(job_id, state = %JobState::Created, "Job created");
        Self {
            job_id: job_id.to_string(),
            state: JobState::Created,
        }
    }

    fn enter(&mut self, state: JobState) {
        info!(job_id = %self.job_id, from = %self.state, state = %state, "State transition");
        self.state = state;
    }
}

/// Sequences fetch, probe, build, transcode, caption and notify for jobs
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<Config>,
    builder: CommandBuilder,
    fetcher: Arc<dyn AssetFetcher>,
    prober: Arc<dyn MediaProber>,
    transcoder: Arc<dyn Transcoder>,
    transcriber: Arc<dyn Transcriber>,
    notifier: Arc<dyn Notifier>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        config: Config,
        fetcher: Arc<dyn AssetFetcher>,
        prober: Arc<dyn MediaProber>,
        transcoder: Arc<dyn Transcoder>,
        transcriber: Arc<dyn Transcriber>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            builder: CommandBuilder::new(&config.ffmpeg_path),
            config: Arc::new(config),
            fetcher,
            prober,
            transcoder,
            transcriber,
            notifier,
        }
    }

    /// Wire the production collaborators described by `config`
    pub fn from_config(config: Config) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(config.http_timeout())?);
        let prober = Arc::new(FfprobeProber::new(&config.ffprobe_path));
        let transcoder = Arc::new(FfmpegTranscoder::new(config.transcode_timeout()));
        let transcriber = transcribe::from_config(&config.transcription, config.http_timeout())?;
        let notifier = Arc::new(WebhookNotifier::new(config.http_timeout())?);
        Ok(Self::new(
            config,
            fetcher,
            prober,
            transcoder,
            transcriber,
            notifier,
        ))
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validate a request synchronously
    pub fn accept(&self, request: CompositionRequest) -> Result<CompositionJob> {
        request.validate(self.config.per_image_secs)
    }

    /// Validate `request` and run it on a background task.
    ///
    /// Malformed requests are rejected here; everything later is reported
    /// through the returned handle.
    pub fn submit(&self, request: CompositionRequest) -> Result<JoinHandle<CompositionResult>> {
        let job = self.accept(request)?;
        info!(job_id = %job.id(), mode = ?job.composition_mode(), "Job accepted");
        let orchestrator = self.clone();
        Ok(tokio::spawn(async move { orchestrator.run(job).await }))
    }

    /// Look up a record's attachments and merge them.
    ///
    /// A record missing either attachment is rejected before any download.
    pub async fn run_record(
        &self,
        record_id: &str,
        callback_url: &str,
        lookup: &dyn RecordLookup,
    ) -> Result<CompositionResult> {
        let record = lookup.lookup(record_id).await?;
        let job = self.accept(record.into_request(record_id, callback_url)?)?;
        Ok(self.run(job).await)
    }

    /// Run one job to its terminal state
    #[instrument(skip(self, job), fields(job_id = %job.id()))]
    pub async fn run(&self, job: CompositionJob) -> CompositionResult {
        let mut tracker = StageTracker::new(job.id());

        let workspace = match Workspace::create(&self.config.work_root, job.id()).await {
            Ok(ws) => ws,
            Err(e) => return Self::fail(&job, &tracker, &e),
        };

        let result = match self.produce(&job, &workspace, &mut tracker).await {
            Ok(artifact) => self.deliver(&job, artifact, &mut tracker).await,
            Err(e) => Self::fail(&job, &tracker, &e),
        };

        if let Err(e) = workspace.reclaim().await {
            warn!("Workspace cleanup failed: {e}");
        }

        if !matches!(result, CompositionResult::Failed { .. }) {
            tracker.enter(JobState::Done);
        }
        result
    }

    fn fail(job: &CompositionJob, tracker: &StageTracker, err: &ComposeError) -> CompositionResult {
        warn!(
            job_id = %job.id(),
            stage = %tracker.state,
            kind = ?err.kind(),
            state = %JobState::Failed,
            "Job failed: {err}"
        );
        CompositionResult::failed(job.id(), tracker.state, err)
    }

    /// Everything up to the artifact landing in the output directory
    async fn produce(
        &self,
        job: &CompositionJob,
        workspace: &Workspace,
        tracker: &mut StageTracker,
    ) -> Result<Artifact> {
        tracker.enter(JobState::Fetching);
        let downloads = download_plan(job.mode(), workspace);
        self.fetch_all(&downloads).await?;

        tracker.enter(JobState::Validating);
        let inputs = self.validate_inputs(job.mode(), &downloads).await?;

        tracker.enter(JobState::Building);
        let filename = job.artifact_filename(chrono::Utc::now().timestamp_millis());
        let staged = workspace.derived_path(&filename);
        let graph = self.build(job.mode(), inputs, workspace, &staged)?;
        debug!("Planned {} transcoding stage(s)", graph.stage_count());

        tracker.enter(JobState::Transcoding);
        self.transcoder.run(&graph.primary).await?;

        let mut finished = graph.final_output().to_path_buf();
        if let Some(stage) = &graph.captions {
            tracker.enter(JobState::Captioning);
            let captioned = self.caption(&graph.primary.output, &stage.subtitles).await?;

            if captioned {
                tracker.enter(JobState::Transcoding);
                self.transcoder.run(&stage.burn_in).await?;
            } else {
                warn!("No speech detected, delivering without captions");
                finished = graph.primary.output.clone();
            }
        }

        let path = claim_destination(&self.config.output_dir, &filename).await?;
        let filename = path
            .file_name()
            .map_or(filename, |name| name.to_string_lossy().into_owned());
        if let Err(e) = hand_off(&finished, &path).await {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }
        info!("Artifact ready at {}", path.display());

        Ok(Artifact { filename, path })
    }

    async fn fetch_all(&self, downloads: &[Download<'_>]) -> Result<()> {
        let bytes = try_join_all(
            downloads
                .iter()
                .map(|d| self.fetcher.fetch(d.asset.url.as_str(), &d.path)),
        )
        .await?;
        info!(
            assets = downloads.len(),
            bytes = bytes.iter().sum::<u64>(),
            "Fetched all assets"
        );
        Ok(())
    }

    async fn validate_inputs(&self, mode: &JobMode, downloads: &[Download<'_>]) -> Result<Inputs> {
        let probes = join_all(downloads.iter().map(|d| self.prober.probe(&d.path))).await;

        match mode {
            JobMode::AudioVideo { .. } => {
                let timed = downloads
                    .iter()
                    .zip(&probes)
                    .map(|(d, info)| {
                        Ok(TimedInput {
                            path: d.path.clone(),
                            duration_secs: info.require_positive_duration(&d.path)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let [video, audio]: [TimedInput; 2] = timed
                    .try_into()
                    .map_err(|_| ComposeError::Build("merge needs exactly two inputs".to_string()))?;
                Ok(Inputs::Merge { video, audio })
            }
            JobMode::ClipConcat { .. } => {
                let clips = downloads
                    .iter()
                    .zip(&probes)
                    .map(|(d, info)| {
                        info.require_positive_duration(&d.path)?;
                        Ok(ClipInput {
                            path: d.path.clone(),
                            sequence: d.asset.sequence,
                            position: d.asset.position,
                            has_audio: info.has_audio,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Inputs::Clips(clips))
            }
            JobMode::ImageSequence { .. } => {
                for (d, info) in downloads.iter().zip(&probes) {
                    info.require_picture(&d.path)?;
                }
                Ok(Inputs::Images(downloads.iter().map(|d| d.path.clone()).collect()))
            }
        }
    }

    fn build(
        &self,
        mode: &JobMode,
        inputs: Inputs,
        workspace: &Workspace,
        staged: &Path,
    ) -> Result<CommandGraph> {
        match (mode, inputs) {
            (JobMode::AudioVideo { .. }, Inputs::Merge { video, audio }) => Ok(CommandGraph::single(
                self.builder.audio_video_merge(&video, &audio, staged),
            )),
            (JobMode::ClipConcat { frame, .. }, Inputs::Clips(clips)) => {
                self.builder.clip_concat_with_captions(
                    &clips,
                    *frame,
                    &workspace.derived_path(COMBINED_NAME),
                    &workspace.derived_path(SUBTITLES_NAME),
                    staged,
                )
            }
            (
                JobMode::ImageSequence {
                    frame,
                    per_image_secs,
                    ..
                },
                Inputs::Images(images),
            ) => Ok(CommandGraph::single(self.builder.image_sequence(
                &images,
                *frame,
                *per_image_secs,
                staged,
            )?)),
            _ => Err(ComposeError::Build(
                "validated inputs do not match the job mode".to_string(),
            )),
        }
    }

    /// Generate and reflow captions for `video`.
    ///
    /// Returns `false` when the document is valid but has no cues.
    async fn caption(&self, video: &Path, subtitles: &Path) -> Result<bool> {
        self.transcriber.transcribe(video, subtitles).await?;

        let document = SubtitleDocument::read_from(subtitles).await?;
        if document.is_empty() {
            return Ok(false);
        }

        let reflowed = document.reflow(self.config.max_words_per_line);
        reflowed.write_to(subtitles).await?;
        debug!(
            cues = reflowed.len(),
            max_words = reflowed.max_words_per_line(),
            "Captions reflowed"
        );
        Ok(true)
    }

    async fn deliver(
        &self,
        job: &CompositionJob,
        artifact: Artifact,
        tracker: &mut StageTracker,
    ) -> CompositionResult {
        tracker.enter(JobState::Notifying);
        let url = self.config.artifact_url(&artifact.filename);
        let payload = CallbackPayload {
            id: job.id().to_string(),
            url: url.clone(),
        };

        match self.notifier.notify(job.callback_url().as_str(), &payload).await {
            Ok(()) => CompositionResult::Delivered {
                id: job.id().to_string(),
                url,
                path: artifact.path,
            },
            Err(e) => {
                warn!("Artifact produced but delivery failed: {e}");
                CompositionResult::DeliveryFailed {
                    id: job.id().to_string(),
                    url,
                    path: artifact.path,
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// One asset and where it lands in the workspace
struct Download<'a> {
    asset: &'a AssetSpec,
    path: PathBuf,
}

/// Probed inputs, shaped for the command builder
enum Inputs {
    Merge { video: TimedInput, audio: TimedInput },
    Clips(Vec<ClipInput>),
    Images(Vec<PathBuf>),
}

fn download_plan<'a>(mode: &'a JobMode, workspace: &Workspace) -> Vec<Download<'a>> {
    match mode {
        JobMode::AudioVideo { video, audio } => vec![
            Download {
                asset: video,
                path: workspace.asset_path(AssetRole::Video, 0, "mp4"),
            },
            Download {
                asset: audio,
                path: workspace.asset_path(AssetRole::Audio, 0, "mp3"),
            },
        ],
        JobMode::ClipConcat { clips, .. } => clips
            .iter()
            .enumerate()
            .map(|(i, asset)| Download {
                asset,
                path: workspace.asset_path(AssetRole::Video, i, "mp4"),
            })
            .collect(),
        JobMode::ImageSequence { images, .. } => images
            .iter()
            .enumerate()
            .map(|(i, asset)| {
                let ext = asset.url_extension().unwrap_or_else(|| "jpg".to_string());
                Download {
                    asset,
                    path: workspace.asset_path(AssetRole::Image, i, &ext),
                }
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{AssetDescriptor, CompositionMode};

    fn image_job(srcs: &[&str]) -> CompositionJob {
        CompositionRequest {
            id: "rec1".to_string(),
            mode: CompositionMode::ImageSequence,
            assets: srcs.iter().map(|s| AssetDescriptor::new(*s)).collect(),
            fps: Some(24),
            width: Some(640),
            height: Some(480),
            duration: None,
            callback_url: "https://hooks.example.com/done".to_string(),
        }
        .validate(5.0)
        .unwrap()
    }

    #[tokio::test]
    async fn image_downloads_keep_url_extension_or_default_to_jpg() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(root.path(), "rec1").await.unwrap();
        let job = image_job(&[
            "https://cdn.example.com/a.PNG",
            "https://cdn.example.com/render?id=4",
        ]);

        let plan = download_plan(job.mode(), &workspace);
        let names: Vec<String> = plan
            .iter()
            .map(|d| d.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["image_0.png", "image_1.jpg"]);
    }

    #[tokio::test]
    async fn merge_downloads_use_fixed_extensions() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(root.path(), "rec1").await.unwrap();
        let job = CompositionRequest {
            id: "rec1".to_string(),
            mode: CompositionMode::AudioVideo,
            assets: vec![
                AssetDescriptor::new("https://cdn.example.com/v"),
                AssetDescriptor::new("https://cdn.example.com/a"),
            ],
            fps: None,
            width: None,
            height: None,
            duration: None,
            callback_url: "https://hooks.example.com/done".to_string(),
        }
        .validate(5.0)
        .unwrap();

        let plan = download_plan(job.mode(), &workspace);
        assert!(plan[0].path.ends_with("video_0.mp4"));
        assert!(plan[1].path.ends_with("audio_0.mp3"));
    }

    #[test]
    fn tracker_records_current_stage() {
        let mut tracker = StageTracker::new("rec1");
        assert_eq!(tracker.state, JobState::Created);
        tracker.enter(JobState::Fetching);
        tracker.enter(JobState::Validating);
        assert_eq!(tracker.state, JobState::Validating);
    }
}
