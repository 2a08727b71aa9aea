//! ffmpeg command graphs for each composition mode
//!
//! Everything here is pure: the builder returns argument lists and never
//! touches the filesystem or spawns processes.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use crate::error::{ComposeError, Result};
use crate::job::FrameSpec;

use super::command::{CaptionStage, CommandGraph, TranscodeCommand};

/// Zoom increment per output frame for still images
const ZOOM_STEP: f64 = 0.0015;
/// Maximum zoom factor reached by the pan/zoom effect
const ZOOM_MAX: f64 = 1.5;
/// Sample rate concatenated audio is normalized to
const CONCAT_SAMPLE_RATE: u32 = 48_000;

/// Codec settings for one kind of output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSettings {
    pub video_codec: String,
    /// x264 speed/quality preset
    pub preset: String,
    pub crf: u8,
    pub audio_codec: Option<String>,
    pub audio_bitrate: Option<String>,
}

impl EncodeSettings {
    /// Audio-video merge: fast preset, AAC 128k
    #[must_use]
    pub fn merge() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "fast".to_string(),
            crf: 22,
            audio_codec: Some("aac".to_string()),
            audio_bitrate: Some("128k".to_string()),
        }
    }

    /// Concatenation, image sequences and burn-in: medium preset
    #[must_use]
    pub fn standard() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "medium".to_string(),
            crf: 23,
            audio_codec: Some("aac".to_string()),
            audio_bitrate: Some("128k".to_string()),
        }
    }

    fn push_video(&self, args: &mut Vec<String>) {
        args.extend([
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
        ]);
    }

    fn push_audio(&self, args: &mut Vec<String>) {
        if let Some(ref codec) = self.audio_codec {
            args.push("-c:a".to_string());
            args.push(codec.clone());
        }
        if let Some(ref bitrate) = self.audio_bitrate {
            args.push("-b:a".to_string());
            args.push(bitrate.clone());
        }
    }
}

/// Burned-in caption appearance (ASS `force_style` fields)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionStyle {
    pub font_name: String,
    pub font_size: u32,
    /// Fill colour, ASS `&HBBGGRR&`
    pub primary_colour: String,
    pub outline_colour: String,
    /// 1 = outline + shadow, 3 = opaque box
    pub border_style: u8,
    pub outline: u32,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_name: "Arial".to_string(),
            font_size: 24,
            primary_colour: "&HFFFFFF&".to_string(), // White
            outline_colour: "&H000000&".to_string(), // Black
            border_style: 3,
            outline: 2,
        }
    }
}

impl CaptionStyle {
    /// Value for the `subtitles` filter `force_style` option
    #[must_use]
    pub fn to_force_style(&self) -> String {
        format!(
            "FontName={},FontSize={},PrimaryColour={},OutlineColour={},BorderStyle={},Outline={}",
            self.font_name,
            self.font_size,
            self.primary_colour,
            self.outline_colour,
            self.border_style,
            self.outline,
        )
    }
}

/// Media input whose duration already passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct TimedInput {
    pub path: PathBuf,
    pub duration_secs: f64,
}

/// One clip of a concatenation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipInput {
    pub path: PathBuf,
    /// Declared ordering key
    pub sequence: Option<i64>,
    /// Position in the request, breaks ties
    pub position: usize,
    pub has_audio: bool,
}

/// Ascending sequence key; clips without a key go last; ties keep request order
#[must_use]
pub fn by_sequence_key(a: &ClipInput, b: &ClipInput) -> Ordering {
    match (a.sequence, b.sequence) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then(a.position.cmp(&b.position))
}

/// Total length of an image sequence
#[must_use]
pub fn image_sequence_duration(count: usize, per_image_secs: f64) -> f64 {
    // Counts past u32::MAX saturate; no request carries that many stills.
    f64::from(u32::try_from(count).unwrap_or(u32::MAX)) * per_image_secs
}

/// Escape a path for embedding as an unquoted filter option value.
///
/// ffmpeg unescapes a filter description twice: once when splitting the
/// graph on `[ ] , ;` and once when splitting options on `:`. Quoting is
/// not usable here because nothing inside `'...'` can escape a `'`.
#[must_use]
pub fn escape_filter_path(path: &Path) -> String {
    let option = escape_chars(&path.to_string_lossy(), &['\\', ':', '\'']);
    escape_chars(&option, &['\\', '\'', '[', ']', ',', ';'])
}

fn escape_chars(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Builds [`TranscodeCommand`]s for ffmpeg
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    ffmpeg_path: String,
    merge: EncodeSettings,
    standard: EncodeSettings,
    caption_style: CaptionStyle,
}

impl CommandBuilder {
    #[must_use]
    pub fn new(ffmpeg_path: &str) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.to_string(),
            merge: EncodeSettings::merge(),
            standard: EncodeSettings::standard(),
            caption_style: CaptionStyle::default(),
        }
    }

    #[must_use]
    pub fn with_caption_style(mut self, style: CaptionStyle) -> Self {
        self.caption_style = style;
        self
    }

    fn base_args() -> Vec<String> {
        ["-hide_banner", "-nostdin", "-loglevel", "warning", "-stats"]
            .iter()
            .map(std::string::ToString::to_string)
            .collect()
    }

    fn command(&self, mut args: Vec<String>, output: &Path) -> TranscodeCommand {
        args.push("-y".to_string());
        args.push(output.to_string_lossy().to_string());
        TranscodeCommand {
            program: self.ffmpeg_path.clone(),
            args,
            output: output.to_path_buf(),
        }
    }

    /// Re-encode one video and one audio input, cut to the shorter stream
    #[must_use]
    pub fn audio_video_merge(
        &self,
        video: &TimedInput,
        audio: &TimedInput,
        output: &Path,
    ) -> TranscodeCommand {
        let length = video.duration_secs.min(audio.duration_secs);

        let mut args = Self::base_args();
        args.extend([
            "-i".to_string(),
            video.path.to_string_lossy().to_string(),
            "-i".to_string(),
            audio.path.to_string_lossy().to_string(),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "1:a:0".to_string(),
        ]);
        self.merge.push_video(&mut args);
        self.merge.push_audio(&mut args);
        args.extend([
            "-t".to_string(),
            format!("{length:.3}"),
            "-shortest".to_string(),
        ]);

        self.command(args, output)
    }

    /// Concatenate clips in sequence-key order at the target frame size and rate.
    ///
    /// Audio is kept when every clip has it and dropped when none has;
    /// a mix of both is rejected.
    pub fn clip_concat(
        &self,
        clips: &[ClipInput],
        frame: FrameSpec,
        output: &Path,
    ) -> Result<TranscodeCommand> {
        if clips.is_empty() {
            return Err(ComposeError::Build("no clips to concatenate".to_string()));
        }

        let with_audio = clips.iter().filter(|c| c.has_audio).count();
        let keep_audio = match with_audio {
            0 => false,
            n if n == clips.len() => true,
            _ => {
                let silent: Vec<String> = clips
                    .iter()
                    .filter(|c| !c.has_audio)
                    .map(|c| c.path.display().to_string())
                    .collect();
                return Err(ComposeError::Build(format!(
                    "clips mix audio and silent tracks; silent: {}",
                    silent.join(", ")
                )));
            }
        };

        let mut ordered: Vec<&ClipInput> = clips.iter().collect();
        ordered.sort_by(|a, b| by_sequence_key(a, b));

        let FrameSpec { fps, width, height } = frame;
        let mut args = Self::base_args();
        let mut filters = Vec::with_capacity(ordered.len() * 2 + 1);
        let mut concat_inputs = String::new();

        for (i, clip) in ordered.iter().enumerate() {
            args.push("-i".to_string());
            args.push(clip.path.to_string_lossy().to_string());

            filters.push(format!(
                "[{i}:v]scale={width}:{height}:force_original_aspect_ratio=decrease,\
                 pad={width}:{height}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps}[v{i}]"
            ));
            concat_inputs.push_str(&format!("[v{i}]"));

            if keep_audio {
                filters.push(format!(
                    "[{i}:a]aformat=sample_rates={CONCAT_SAMPLE_RATE}:channel_layouts=stereo[a{i}]"
                ));
                concat_inputs.push_str(&format!("[a{i}]"));
            }
        }

        let n = ordered.len();
        if keep_audio {
            filters.push(format!("{concat_inputs}concat=n={n}:v=1:a=1[outv][outa]"));
        } else {
            filters.push(format!("{concat_inputs}concat=n={n}:v=1:a=0[outv]"));
        }

        args.push("-filter_complex".to_string());
        args.push(filters.join(";"));
        args.extend(["-map".to_string(), "[outv]".to_string()]);
        if keep_audio {
            args.extend(["-map".to_string(), "[outa]".to_string()]);
        }
        args.extend([
            "-r".to_string(),
            fps.to_string(),
            "-s".to_string(),
            frame.size(),
        ]);
        self.standard.push_video(&mut args);
        if keep_audio {
            self.standard.push_audio(&mut args);
        }

        Ok(self.command(args, output))
    }

    /// Still images, each zoomed in from the centre for `per_image_secs`,
    /// concatenated into a silent video of `count * per_image_secs` seconds.
    pub fn image_sequence(
        &self,
        images: &[PathBuf],
        frame: FrameSpec,
        per_image_secs: f64,
        output: &Path,
    ) -> Result<TranscodeCommand> {
        if images.is_empty() {
            return Err(ComposeError::Build("no images to compose".to_string()));
        }
        if !per_image_secs.is_finite() || per_image_secs <= 0.0 {
            return Err(ComposeError::Build(format!(
                "per-image duration must be positive, got {per_image_secs}"
            )));
        }

        let FrameSpec { fps, width, height } = frame;
        // Finite and >= 1.0 after the check above; fractional frames round away.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let frames_per_image = (per_image_secs * f64::from(fps)).round().max(1.0) as u64;
        let total = image_sequence_duration(images.len(), per_image_secs);

        let mut args = Self::base_args();
        let mut filters = Vec::with_capacity(images.len() + 1);
        let mut concat_inputs = String::new();

        for (i, image) in images.iter().enumerate() {
            args.push("-i".to_string());
            args.push(image.to_string_lossy().to_string());

            filters.push(format!(
                "[{i}:v]scale={width}:{height},\
                 zoompan=z='min(zoom+{ZOOM_STEP},{ZOOM_MAX})':d={frames_per_image}:\
                 x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':s={width}x{height}:fps={fps},\
                 trim=duration={per_image_secs},setpts=PTS-STARTPTS[v{i}]"
            ));
            concat_inputs.push_str(&format!("[v{i}]"));
        }
        filters.push(format!(
            "{concat_inputs}concat=n={}:v=1:a=0,format=yuv420p[v]",
            images.len()
        ));

        args.push("-filter_complex".to_string());
        args.push(filters.join(";"));
        args.extend([
            "-map".to_string(),
            "[v]".to_string(),
            "-t".to_string(),
            total.to_string(),
            "-r".to_string(),
            fps.to_string(),
        ]);
        self.standard.push_video(&mut args);

        Ok(self.command(args, output))
    }

    /// Overlay `subtitles` onto `video` with the configured caption style
    #[must_use]
    pub fn burn_in(&self, video: &Path, subtitles: &Path, output: &Path) -> TranscodeCommand {
        let filter = format!(
            "subtitles=filename={}:force_style='{}'",
            escape_filter_path(subtitles),
            self.caption_style.to_force_style()
        );

        let mut args = Self::base_args();
        args.extend([
            "-i".to_string(),
            video.to_string_lossy().to_string(),
            "-vf".to_string(),
            filter,
        ]);
        self.standard.push_video(&mut args);
        args.extend(["-c:a".to_string(), "copy".to_string()]);

        self.command(args, output)
    }

    /// Concatenation followed by a caption burn-in stage
    pub fn clip_concat_with_captions(
        &self,
        clips: &[ClipInput],
        frame: FrameSpec,
        combined: &Path,
        subtitles: &Path,
        output: &Path,
    ) -> Result<CommandGraph> {
        let primary = self.clip_concat(clips, frame, combined)?;
        let burn_in = self.burn_in(combined, subtitles, output);
        Ok(CommandGraph {
            primary,
            captions: Some(CaptionStage {
                subtitles: subtitles.to_path_buf(),
                burn_in,
            }),
        })
    }
}
