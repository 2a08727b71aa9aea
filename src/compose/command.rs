//! Transcoding commands as plain data

use std::fmt;
use std::path::{Path, PathBuf};

/// One external transcoding invocation: program, argument list, output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeCommand {
    pub program: String,
    pub args: Vec<String>,
    /// File the command produces
    pub output: PathBuf,
}

impl TranscodeCommand {
    /// Number of `-i` inputs
    #[must_use]
    pub fn input_count(&self) -> usize {
        self.args.iter().filter(|a| a.as_str() == "-i").count()
    }

    /// Input files in the order they are passed
    #[must_use]
    pub fn inputs(&self) -> Vec<&str> {
        self.args
            .windows(2)
            .filter(|w| w[0] == "-i")
            .map(|w| w[1].as_str())
            .collect()
    }

    /// Value following `flag`, if present
    #[must_use]
    pub fn arg_value(&self, flag: &str) -> Option<&str> {
        self.args
            .windows(2)
            .find(|w| w[0] == flag)
            .map(|w| w[1].as_str())
    }

    #[must_use]
    pub fn filter_graph(&self) -> Option<&str> {
        self.arg_value("-filter_complex")
            .or_else(|| self.arg_value("-vf"))
    }
}

/// Shell-style rendering for logs. Commands are never run through a shell.
impl fmt::Display for TranscodeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=+,@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

/// Caption stage that runs after the primary command has finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionStage {
    /// Subtitle file the transcription step must produce
    pub subtitles: PathBuf,
    /// Burns `subtitles` into the primary output
    pub burn_in: TranscodeCommand,
}

/// Ordered transcoding plan for one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandGraph {
    pub primary: TranscodeCommand,
    pub captions: Option<CaptionStage>,
}

impl CommandGraph {
    #[must_use]
    pub fn single(primary: TranscodeCommand) -> Self {
        Self {
            primary,
            captions: None,
        }
    }

    /// Path of the job's terminal artifact
    #[must_use]
    pub fn final_output(&self) -> &Path {
        self.captions
            .as_ref()
            .map_or(&self.primary.output, |c| &c.burn_in.output)
    }

    /// Number of transcoding invocations in the plan
    #[must_use]
    pub fn stage_count(&self) -> usize {
        1 + usize::from(self.captions.is_some())
    }
}
