//! Transcoder subprocess execution
//!
//! Runs one command to completion while both output pipes are drained on
//! their own tasks, so a chatty ffmpeg never blocks on a full pipe. Exit
//! status is the only success criterion.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::compose::TranscodeCommand;
use crate::error::{ComposeError, Result};

/// Diagnostic lines kept for error reports
const DEFAULT_TAIL_LINES: usize = 20;

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputChannel {
    Stdout,
    Stderr,
}

/// Receives every output line of a running command
pub type OutputObserver = Arc<dyn Fn(OutputChannel, &str) + Send + Sync>;

/// Executes transcoding commands
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Run `command`; `Ok` only on exit code zero
    async fn run(&self, command: &TranscodeCommand) -> Result<()>;
}

/// Subprocess-backed transcoder
pub struct FfmpegTranscoder {
    timeout: Option<Duration>,
    tail_lines: usize,
    observer: Option<OutputObserver>,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new(None)
    }
}

impl FfmpegTranscoder {
    /// `timeout` kills the process and fails the stage when exceeded
    #[must_use]
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            tail_lines: DEFAULT_TAIL_LINES,
            observer: None,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: OutputObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    #[must_use]
    pub fn with_tail_lines(mut self, lines: usize) -> Self {
        self.tail_lines = lines.max(1);
        self
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn run(&self, command: &TranscodeCommand) -> Result<()> {
        info!("Running {} -> {}", command.program, command.output.display());
        debug!("Command: {command}");

        let failure = |code: Option<i32>, tail: String| ComposeError::Transcode {
            program: command.program.clone(),
            code,
            tail,
        };

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| failure(None, format!("failed to start: {e}")))?;

        let stdout_task = child.stdout.take().map(|out| {
            let observer = self.observer.clone();
            tokio::spawn(pump(out, OutputChannel::Stdout, observer, 0))
        });
        let stderr_task = child.stderr.take().map(|err| {
            let observer = self.observer.clone();
            tokio::spawn(pump(err, OutputChannel::Stderr, observer, self.tail_lines))
        });

        let waited = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => Some(status?),
                Err(_) => {
                    warn!("{} exceeded {:?}, killing", command.program, limit);
                    child.kill().await?;
                    None
                }
            },
            None => Some(child.wait().await?),
        };

        if let Some(task) = stdout_task {
            let _ = task.await;
        }
        let tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        }
        .join("\n");

        match waited {
            Some(status) if status.success() => {
                info!("Finished {}", command.output.display());
                Ok(())
            }
            Some(status) => Err(failure(status.code(), tail)),
            None => {
                let limit = self.timeout.unwrap_or_default();
                Err(failure(
                    None,
                    format!("timed out after {}s\n{tail}", limit.as_secs()),
                ))
            }
        }
    }
}

/// Drain `reader`, logging each line and keeping the last `keep` lines.
///
/// ffmpeg separates progress updates with `\r`, so both `\r` and `\n` end a line.
async fn pump<R>(
    mut reader: R,
    channel: OutputChannel,
    observer: Option<OutputObserver>,
    keep: usize,
) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let mut tail: VecDeque<String> = VecDeque::with_capacity(keep);
    let mut pending: Vec<u8> = Vec::new();
    let mut buffer = [0u8; 8 * 1024];

    let emit = |raw: &[u8], tail: &mut VecDeque<String>| {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end();
        if line.is_empty() {
            return;
        }
        match channel {
            OutputChannel::Stdout => debug!("ffmpeg stdout: {}", line),
            OutputChannel::Stderr if line.contains("Error") || line.contains("Warning") => {
                warn!("ffmpeg: {}", line);
            }
            OutputChannel::Stderr => debug!("ffmpeg: {}", line),
        }
        if let Some(ref observer) = observer {
            observer(channel, line);
        }
        if keep > 0 {
            if tail.len() == keep {
                tail.pop_front();
            }
            tail.push_back(line.to_string());
        }
    };

    loop {
        let n = match reader.read(&mut buffer).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for &byte in &buffer[..n] {
            if byte == b'\n' || byte == b'\r' {
                emit(&pending, &mut tail);
                pending.clear();
            } else {
                pending.push(byte);
            }
        }
    }
    emit(&pending, &mut tail);

    tail.into_iter().collect()
}
