//! `vidweave` CLI - run composition jobs and caption utilities

use std::path::{Path, PathBuf};
use std::process::{ExitCode, Stdio};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing_subscriber::EnvFilter;

use vidweave::{
    CompositionRequest, CompositionResult, Config, HttpRecordLookup, Orchestrator,
    SubtitleDocument,
};

#[derive(Parser)]
#[command(name = "vidweave")]
#[command(about = "Compose remote media into finished videos with ffmpeg")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/vidweave/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Public base URL artifacts are served under
    #[arg(long, global = true)]
    public_url: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a composition request from a JSON file
    Run {
        /// Request file (`-` for stdin)
        request: PathBuf,
    },

    /// Merge the video and audio attachments of a record
    Merge {
        /// Record identifier
        record_id: String,

        /// Webhook that receives `{id, url}`
        #[arg(long)]
        callback: String,
    },

    /// Check that ffmpeg and ffprobe are runnable
    Check,

    /// Reflow an SRT file to short caption lines
    Reflow {
        /// SRT file
        file: PathBuf,

        /// Maximum words per line
        #[arg(short, long)]
        words: Option<usize>,

        /// Rewrite the file instead of printing
        #[arg(short, long)]
        in_place: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = cli.public_url.as_deref() {
        config = config.with_public_base_url(url);
    }

    match cli.command {
        Commands::Run { request } => cmd_run(config, &request).await,
        Commands::Merge {
            record_id,
            callback,
        } => cmd_merge(config, &record_id, &callback).await,
        Commands::Check => cmd_check(&config).await,
        Commands::Reflow {
            file,
            words,
            in_place,
        } => {
            cmd_reflow(&file, words.unwrap_or(config.max_words_per_line), in_place).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn cmd_run(config: Config, request: &Path) -> Result<ExitCode> {
    let body = if request == Path::new("-") {
        let mut body = String::new();
        tokio::io::stdin()
            .read_to_string(&mut body)
            .await
            .context("Failed to read request from stdin")?;
        body
    } else {
        tokio::fs::read_to_string(request)
            .await
            .with_context(|| format!("Failed to read {}", request.display()))?
    };

    let orchestrator = Orchestrator::from_config(config)?;
    let job = orchestrator
        .accept(CompositionRequest::from_json(&body)?)
        .context("Request rejected")?;

    let result = orchestrator.run(job).await;
    report(&result)
}

async fn cmd_merge(config: Config, record_id: &str, callback: &str) -> Result<ExitCode> {
    let Some(lookup_config) = config.record_lookup.clone() else {
        bail!("[record_lookup] is not configured");
    };
    let lookup = HttpRecordLookup::new(lookup_config, config.http_timeout())?;
    let orchestrator = Orchestrator::from_config(config)?;

    let result = orchestrator
        .run_record(record_id, callback, &lookup)
        .await
        .with_context(|| format!("Record {record_id} rejected"))?;
    report(&result)
}

/// Print the result as JSON; exit 1 on failure, 2 when only delivery failed
fn report(result: &CompositionResult) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(match result {
        CompositionResult::Delivered { .. } => ExitCode::SUCCESS,
        CompositionResult::DeliveryFailed { .. } => ExitCode::from(2),
        CompositionResult::Failed { .. } => ExitCode::FAILURE,
    })
}

async fn cmd_check(config: &Config) -> Result<ExitCode> {
    let mut healthy = true;
    for program in [&config.ffmpeg_path, &config.ffprobe_path] {
        let status = Command::new(program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(s) if s.success() => println!("ok       {program}"),
            Ok(s) => {
                healthy = false;
                println!("failed   {program} ({s})");
            }
            Err(e) => {
                healthy = false;
                println!("missing  {program} ({e})");
            }
        }
    }
    Ok(if healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_reflow(file: &Path, words: usize, in_place: bool) -> Result<()> {
    let document = SubtitleDocument::read_from(file)
        .await
        .with_context(|| format!("Failed to parse {}", file.display()))?
        .reflow(words);

    if in_place {
        document.write_to(file).await?;
        eprintln!("Reflowed {} cues in {}", document.len(), file.display());
    } else {
        print!("{}", document.render());
    }
    Ok(())
}
