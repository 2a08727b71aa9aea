//! SRT caption documents and line reflow
//!
//! Generated captions tend to carry a whole sentence per cue, which is too
//! dense on screen at a legible font size. [`SubtitleDocument::reflow`]
//! splits every text line into lines of at most N words while keeping cue
//! indices and time ranges as they were.

use std::fmt::Write as FmtWrite;
use std::path::Path;

use tokio::fs;

use crate::error::{ComposeError, Result};

/// One timed caption cue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleEntry {
    pub index: u32,
    /// Start time in milliseconds
    pub start_ms: u64,
    /// End time in milliseconds
    pub end_ms: u64,
    /// Displayed text lines
    pub lines: Vec<String>,
}

impl SubtitleEntry {
    #[must_use]
    pub fn new(index: u32, start_ms: u64, end_ms: u64, text: impl Into<String>) -> Self {
        Self {
            index,
            start_ms,
            end_ms,
            lines: vec![text.into()],
        }
    }

    /// Format time as SRT timestamp (HH:MM:SS,mmm)
    fn format_srt_time(ms: u64) -> String {
        let hours = ms / 3_600_000;
        let minutes = (ms % 3_600_000) / 60_000;
        let seconds = (ms % 60_000) / 1000;
        let millis = ms % 1000;
        format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
    }

    fn max_words(&self) -> usize {
        self.lines
            .iter()
            .map(|l| l.split_whitespace().count())
            .max()
            .unwrap_or(0)
    }
}

/// Ordered caption cues
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubtitleDocument {
    entries: Vec<SubtitleEntry>,
}

impl SubtitleDocument {
    #[must_use]
    pub fn new(entries: Vec<SubtitleEntry>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[SubtitleEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse SRT text. Missing index lines are numbered by position.
    pub fn parse(content: &str) -> Result<Self> {
        let mut entries = Vec::new();
        let mut lines = content.lines().map(|l| l.trim_start_matches('\u{feff}')).peekable();

        while let Some(line) = lines.next() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (index, timing) = if line.contains("-->") {
                (None, line)
            } else {
                let index = line.parse::<u32>().map_err(|_| {
                    ComposeError::Captioning(format!("expected cue index, found '{line}'"))
                })?;
                let timing = lines
                    .next()
                    .map(str::trim)
                    .filter(|l| l.contains("-->"))
                    .ok_or_else(|| {
                        ComposeError::Captioning(format!("cue {index} has no time range"))
                    })?;
                (Some(index), timing)
            };

            let (start_ms, end_ms) = parse_srt_timestamp_line(timing)?;

            let mut text = Vec::new();
            while let Some(next) = lines.peek() {
                if next.trim().is_empty() {
                    break;
                }
                text.push(next.trim().to_string());
                lines.next();
            }

            let fallback = u32::try_from(entries.len() + 1).unwrap_or(u32::MAX);
            entries.push(SubtitleEntry {
                index: index.unwrap_or(fallback),
                start_ms,
                end_ms,
                lines: text,
            });
        }

        Ok(Self { entries })
    }

    /// Render as SRT; cues are separated by one blank line
    #[must_use]
    pub fn render(&self) -> String {
        let mut output = String::new();
        for entry in &self.entries {
            let _ = writeln!(output, "{}", entry.index);
            let _ = writeln!(
                output,
                "{} --> {}",
                SubtitleEntry::format_srt_time(entry.start_ms),
                SubtitleEntry::format_srt_time(entry.end_ms)
            );
            for line in &entry.lines {
                let _ = writeln!(output, "{line}");
            }
            output.push('\n');
        }
        output
    }

    /// Split every text line into lines of at most `max_words` words
    #[must_use]
    pub fn reflow(&self, max_words: usize) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|entry| SubtitleEntry {
                lines: entry
                    .lines
                    .iter()
                    .flat_map(|line| reflow_line(line, max_words))
                    .collect(),
                ..entry.clone()
            })
            .collect();
        Self { entries }
    }

    /// Largest word count of any displayed line
    #[must_use]
    pub fn max_words_per_line(&self) -> usize {
        self.entries
            .iter()
            .map(SubtitleEntry::max_words)
            .max()
            .unwrap_or(0)
    }

    pub async fn read_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            ComposeError::Captioning(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    pub async fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render()).await?;
        Ok(())
    }
}

/// Split `text` into chunks of at most `max_words` whitespace-separated words
#[must_use]
pub fn reflow_line(text: &str, max_words: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(max_words.max(1))
        .map(|chunk| chunk.join(" "))
        .collect()
}

fn parse_srt_timestamp_line(line: &str) -> Result<(u64, u64)> {
    let (start, end) = line
        .split_once("-->")
        .ok_or_else(|| ComposeError::Captioning(format!("invalid time range '{line}'")))?;
    // Positional hints may follow the end time.
    let end = end.split_whitespace().next().unwrap_or_default();
    Ok((parse_srt_timestamp(start.trim())?, parse_srt_timestamp(end)?))
}

fn parse_srt_timestamp(ts: &str) -> Result<u64> {
    let invalid = || ComposeError::Captioning(format!("invalid timestamp '{ts}'"));

    let (hms, millis) = ts.split_once([',', '.']).unwrap_or((ts, "0"));
    let mut parts = hms.split(':');
    let (Some(h), Some(m), Some(s), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };

    let hours: u64 = h.parse().map_err(|_| invalid())?;
    let minutes: u64 = m.parse().map_err(|_| invalid())?;
    let seconds: u64 = s.parse().map_err(|_| invalid())?;
    let millis: u64 = format!("{millis:0<3}")
        .get(..3)
        .and_then(|m| m.parse().ok())
        .ok_or_else(invalid)?;

    Ok(hours * 3_600_000 + minutes * 60_000 + seconds * 1000 + millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHISPER_SRT: &str = "1\n00:00:00,000 --> 00:00:03,200\n Welcome back to the channel everyone\n\n2\n00:00:03,200 --> 00:00:06,050\nToday we look at rust\n\n";

    #[test]
    fn test_srt_time_format() {
        assert_eq!(SubtitleEntry::format_srt_time(0), "00:00:00,000");
        assert_eq!(SubtitleEntry::format_srt_time(3_723_456), "01:02:03,456");
    }

    #[test]
    fn test_parse_srt() {
        let doc = SubtitleDocument::parse(WHISPER_SRT).unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.entries()[0].index, 1);
        assert_eq!(doc.entries()[0].end_ms, 3200);
        assert_eq!(doc.entries()[1].start_ms, 3200);
        assert_eq!(doc.entries()[1].lines, vec!["Today we look at rust"]);
    }

    #[test]
    fn test_reflow_three_words() {
        let doc = SubtitleDocument::parse(WHISPER_SRT).unwrap().reflow(3);
        assert_eq!(
            doc.entries()[0].lines,
            vec!["Welcome back to", "the channel everyone"]
        );
        assert_eq!(doc.entries()[1].lines, vec!["Today we look", "at rust"]);
        assert_eq!(doc.max_words_per_line(), 3);
    }

    #[test]
    fn test_reflow_preserves_index_and_timing() {
        let original = SubtitleDocument::parse(WHISPER_SRT).unwrap();
        let reflowed = original.reflow(3);
        assert_eq!(original.len(), reflowed.len());
        for (a, b) in original.entries().iter().zip(reflowed.entries()) {
            assert_eq!(a.index, b.index);
            assert_eq!((a.start_ms, a.end_ms), (b.start_ms, b.end_ms));
        }
    }

    #[test]
    fn test_reflow_is_idempotent() {
        let once = SubtitleDocument::parse(WHISPER_SRT).unwrap().reflow(3);
        let twice = SubtitleDocument::parse(&once.render()).unwrap().reflow(3);
        assert_eq!(once, twice);
        assert_eq!(once.render(), twice.render());
    }

    #[test]
    fn test_render_layout() {
        let doc = SubtitleDocument::new(vec![SubtitleEntry::new(7, 1500, 2750, "Hi there")]);
        assert_eq!(doc.render(), "7\n00:00:01,500 --> 00:00:02,750\nHi there\n\n");
    }

    #[test]
    fn test_parse_tolerates_crlf_and_missing_index() {
        let doc = SubtitleDocument::parse("00:00:01.5 --> 00:00:02.000\r\nHello\r\n").unwrap();
        assert_eq!(doc.entries()[0].index, 1);
        assert_eq!(doc.entries()[0].start_ms, 1500);
        assert_eq!(doc.entries()[0].lines, vec!["Hello"]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(SubtitleDocument::parse("not subtitles at all").is_err());
        assert!(SubtitleDocument::parse("1\nno timing here\n").is_err());
    }

    #[test]
    fn test_reflow_line_edge_cases() {
        assert!(reflow_line("   ", 3).is_empty());
        assert_eq!(reflow_line("one two", 3), vec!["one two"]);
        assert_eq!(reflow_line("a b c", 0), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_document() {
        let doc = SubtitleDocument::parse("\n\n").unwrap();
        assert!(doc.is_empty());
        assert_eq!(doc.max_words_per_line(), 0);
    }
}
