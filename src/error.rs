//! Error types for seamloop

use std::io;
use thiserror::Error;

/// Errors raised while building a WAV image
#[derive(Error, Debug)]
pub enum ExportError {
    /// Loop bounds do not fit inside the buffer
    #[error("loop {start}..{end} is outside a buffer of {frame_count} frames")]
    LoopOutOfRange {
        start: usize,
        end: usize,
        frame_count: usize,
    },

    #[error("buffer has no channels")]
    NoChannels,

    #[error("channel {channel} has {actual} frames, expected {expected}")]
    ChannelLengthMismatch {
        channel: usize,
        expected: usize,
        actual: usize,
    },

    #[error("{0} channels cannot be stored in a WAV header")]
    TooManyChannels(usize),

    /// A chunk size or loop offset does not fit in 32 bits
    #[error("audio too large for a RIFF container")]
    TooLarge,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised while picking a loop to export
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectError {
    #[error("candidate {} requested but only {available} found", .index + 1)]
    PickOutOfRange { index: usize, available: usize },
}

/// Errors raised while reading WAV input
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("WAV decode error: {0}")]
    Wav(#[from] hound::Error),

    #[error("unsupported sample format: {bits}-bit {format}")]
    UnsupportedFormat { bits: u16, format: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
