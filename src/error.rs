//! Error types shared across the mixing pipeline.
//!
//! Each layer owns one enum. Contract violations (bad formats, overflowing
//! writes) are separate variants from runtime failures so callers can tell a
//! programming error apart from a misbehaving source.

use thiserror::Error;

/// Ring buffer contract violations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// A write asked for more room than the buffer has free.
    #[error("buffer overflow: requested {requested} samples, {available} available")]
    Overflow { requested: usize, available: usize },
    #[error("buffer capacity must be at least one sample")]
    ZeroCapacity,
}

/// Invalid audio format descriptions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("invalid channel count: {0}")]
    InvalidChannels(u16),
    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(u32),
    #[error("unsupported sample encoding: {0}")]
    UnsupportedEncoding(String),
    #[error("{len} bytes is not a whole number of {bytes_per_sample}-byte samples")]
    Misaligned { len: usize, bytes_per_sample: usize },
}

/// Failures raised while decoding a media stream.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported media: {0}")]
    Unsupported(String),
    #[error("no audio track found")]
    NoAudioTrack,
    #[error("failed to create decoder: {0}")]
    DecoderCreation(String),
    #[error("decode failed: {0}")]
    DecodeFailed(String),
    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Failures raised by a resampling context.
#[derive(Debug, Error)]
pub enum ResampleError {
    #[error("failed to construct resampler: {0}")]
    Construction(String),
    #[error("resample failed: {0}")]
    Process(String),
    #[error("resampler has been closed")]
    Closed,
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Failures raised while reading from a mixer channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Resample(#[from] ResampleError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error("channel closed")]
    Closed,
    #[error("{0}")]
    Other(String),
}

/// Failures raised by a mixer sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink is closed")]
    Closed,
    #[error("sink is not running")]
    NotRunning,
    #[error("sink rejected {requested} samples, {available} available")]
    Rejected { requested: usize, available: usize },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Device(String),
}

/// Failures raised by the mixer and its scheduler.
#[derive(Debug, Error)]
pub enum MixerError {
    #[error("{kind} format mismatch: expected {expected_rate}Hz/{expected_channels}ch, got {rate}Hz/{channels}ch")]
    FormatMismatch {
        kind: &'static str,
        expected_rate: u32,
        expected_channels: u16,
        rate: u32,
        channels: u16,
    },
    #[error("filter stage has {got} filters, mixer has {expected} audio channels")]
    FilterWidth { expected: usize, got: usize },
    #[error("invalid mixer parameters: {0}")]
    InvalidParameters(String),
    #[error("sink '{name}' failed during tick: {source}")]
    SinkWrite {
        name: String,
        #[source]
        source: SinkError,
    },
    #[error("mixer command queue disconnected")]
    Disconnected,
    #[error("scheduler thread failed: {0}")]
    Thread(String),
}

/// Failures raised while loading mixer settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings json: {0}")]
    Json(#[from] serde_json::Error),
}
