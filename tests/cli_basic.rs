//! Integration tests for basic CLI behavior.
//!
//! Tests that the binary exists, accepts standard flags, and that the
//! offline subcommands (`reflow`, `check`, request validation) behave.

#![allow(deprecated)] // cargo_bin is deprecated; its replacement is not yet stable

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

/// Helper: get a Command for the `vidweave` binary.
fn vidweave() -> Command {
    let mut cmd = Command::cargo_bin("vidweave").expect("binary 'vidweave' should be built");
    cmd.env("RUST_LOG", "warn");
    cmd
}

fn file_with(content: &str, suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

/// Config that needs no real binaries or services
fn offline_config() -> NamedTempFile {
    file_with(
        "ffmpeg_path = \"/nonexistent/ffmpeg\"\nffprobe_path = \"/nonexistent/ffprobe\"\n",
        ".toml",
    )
}

const SRT: &str = "1\n00:00:00,000 --> 00:00:03,000\nWelcome back to the channel everyone\n\n";

// ─── Top-level flags ─────────────────────────────────────────────────────────

#[test]
fn help_flag_shows_usage() {
    vidweave()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: vidweave"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("merge"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("reflow"));
}

#[test]
fn version_flag_shows_semver() {
    vidweave()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^vidweave \d+\.\d+\.\d+\n$").unwrap());
}

#[test]
fn no_subcommand_is_an_error() {
    vidweave().assert().failure();
}

#[test]
fn missing_explicit_config_is_an_error() {
    vidweave()
        .args(["--config", "/nonexistent/vidweave.toml", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
}

// ─── reflow ──────────────────────────────────────────────────────────────────

#[test]
fn reflow_prints_three_word_lines_by_default() {
    let config = offline_config();
    let srt = file_with(SRT, ".srt");

    vidweave()
        .arg("--config")
        .arg(config.path())
        .arg("reflow")
        .arg(srt.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "00:00:00,000 --> 00:00:03,000\nWelcome back to\nthe channel everyone\n",
        ));
}

#[test]
fn reflow_honors_words_flag() {
    let config = offline_config();
    let srt = file_with(SRT, ".srt");

    vidweave()
        .arg("--config")
        .arg(config.path())
        .args(["reflow", "--words", "2"])
        .arg(srt.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Welcome back\nto the\nchannel everyone\n"));
}

#[test]
fn reflow_in_place_rewrites_file() {
    let config = offline_config();
    let srt = file_with(SRT, ".srt");

    vidweave()
        .arg("--config")
        .arg(config.path())
        .args(["reflow", "--in-place"])
        .arg(srt.path())
        .assert()
        .success();

    let rewritten = std::fs::read_to_string(srt.path()).unwrap();
    assert!(rewritten.contains("Welcome back to\nthe channel everyone\n"));
}

#[test]
fn reflow_rejects_non_srt() {
    let config = offline_config();
    let junk = file_with("definitely not subtitles", ".srt");

    vidweave()
        .arg("--config")
        .arg(config.path())
        .arg("reflow")
        .arg(junk.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse"));
}

// ─── check / run ─────────────────────────────────────────────────────────────

#[test]
fn check_reports_missing_binaries() {
    let config = offline_config();

    vidweave()
        .arg("--config")
        .arg(config.path())
        .arg("check")
        .assert()
        .failure()
        .stdout(predicate::str::contains("missing  /nonexistent/ffmpeg"));
}

#[test]
fn run_rejects_request_without_assets() {
    let config = offline_config();
    let request = file_with(
        r#"{"id": "rec1", "mode": "image_sequence", "assets": [],
            "fps": 24, "width": 640, "height": 480,
            "callback_url": "https://hooks.example.com/done"}"#,
        ".json",
    );

    vidweave()
        .arg("--config")
        .arg(config.path())
        .arg("run")
        .arg(request.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("asset list is empty"));
}

#[test]
fn run_reads_request_from_stdin() {
    let config = offline_config();

    vidweave()
        .arg("--config")
        .arg(config.path())
        .args(["run", "-"])
        .write_stdin(
            r#"{"id": "rec1", "mode": "clip_concat", "assets": [],
                "callback_url": "https://hooks.example.com/done"}"#,
        )
        .assert()
        .failure()
        .stderr(predicate::str::contains("asset list is empty"));
}

#[test]
fn merge_requires_record_lookup_config() {
    let config = offline_config();

    vidweave()
        .arg("--config")
        .arg(config.path())
        .args(["merge", "rec1", "--callback", "https://hooks.example.com/done"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("record_lookup"));
}
