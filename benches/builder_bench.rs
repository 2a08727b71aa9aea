//! Benchmarks for command-graph construction and caption reflow.
//!
//! Run with: `cargo bench --bench builder_bench`

use std::path::{Path, PathBuf};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vidweave::compose::{ClipInput, CommandBuilder};
use vidweave::job::FrameSpec;
use vidweave::SubtitleDocument;

const FRAME: FrameSpec = FrameSpec {
    fps: 30,
    width: 1920,
    height: 1080,
};

fn clips(count: usize) -> Vec<ClipInput> {
    (0..count)
        .map(|i| ClipInput {
            path: PathBuf::from(format!("/work/job/video_{i}.mp4")),
            sequence: Some((count - i) as i64),
            position: i,
            has_audio: true,
        })
        .collect()
}

fn images(count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| PathBuf::from(format!("/work/job/image_{i}.jpg")))
        .collect()
}

/// Whisper-style captions: one sentence per cue
fn captions(cues: usize) -> String {
    let mut srt = String::new();
    for i in 0..cues {
        let start = i * 3;
        srt.push_str(&format!(
            "{}\n00:{:02}:{:02},000 --> 00:{:02}:{:02},500\n\
             so today we are going to look at how this whole thing fits together\n\n",
            i + 1,
            start / 60,
            start % 60,
            (start + 2) / 60,
            (start + 2) % 60,
        ));
    }
    srt
}

fn bench_graphs(c: &mut Criterion) {
    let builder = CommandBuilder::new("ffmpeg");
    let mut group = c.benchmark_group("command_graph");

    for count in [2, 10, 50] {
        group.throughput(Throughput::Elements(count as u64));

        let inputs = clips(count);
        group.bench_with_input(BenchmarkId::new("clip_concat", count), &inputs, |b, inputs| {
            b.iter(|| {
                builder
                    .clip_concat_with_captions(
                        black_box(inputs),
                        FRAME,
                        Path::new("/work/job/combined.mp4"),
                        Path::new("/work/job/subtitles.srt"),
                        Path::new("/work/job/output.mp4"),
                    )
                    .unwrap()
            });
        });

        let stills = images(count);
        group.bench_with_input(BenchmarkId::new("image_sequence", count), &stills, |b, stills| {
            b.iter(|| {
                builder
                    .image_sequence(black_box(stills), FRAME, 5.0, Path::new("/work/job/output.mp4"))
                    .unwrap()
            });
        });
    }

    group.finish();
}

fn bench_reflow(c: &mut Criterion) {
    let mut group = c.benchmark_group("caption_reflow");

    for cues in [10, 100, 1000] {
        let srt = captions(cues);
        group.throughput(Throughput::Bytes(srt.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(cues), &srt, |b, srt| {
            b.iter(|| {
                SubtitleDocument::parse(black_box(srt))
                    .unwrap()
                    .reflow(3)
                    .render()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_graphs, bench_reflow);
criterion_main!(benches);
