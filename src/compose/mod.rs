//! Command graphs for the supported composition modes
//!
//! - **Audio-video merge** - one video + one audio, cut to the shorter stream
//! - **Clip concatenation** - N clips in sequence-key order, optional caption burn-in
//! - **Image sequence** - still images with a centred zoom, concatenated

pub mod builder;
pub mod command;

pub use builder::{
    by_sequence_key, escape_filter_path, image_sequence_duration, CaptionStyle, ClipInput,
    CommandBuilder, EncodeSettings, TimedInput,
};
pub use command::{CaptionStage, CommandGraph, TranscodeCommand};
