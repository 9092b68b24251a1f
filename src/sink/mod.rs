//! Mixer outputs.
//!
//! A [`MixerSink`] is anything the mixer can hand a tick's samples to: a
//! framed queue for a network transport, a PCM writer, or a local device.
//! Sinks are started and stopped by the mixer as it moves between running
//! and stopped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::format::PcmFormat;
use crate::error::SinkError;

pub mod frame;
#[cfg(feature = "local-output")]
pub mod local;
pub mod writer;

pub use frame::{FrameReceiver, FrameSink};
#[cfg(feature = "local-output")]
pub use local::RodioSink;
pub use writer::{PcmOutput, WriterSink};

/// A consumer of mixed audio.
pub trait MixerSink: Send {
    fn name(&self) -> String;

    /// Must match the mixer's rate and channel count.
    fn format(&self) -> PcmFormat;

    /// Samples that can be written right now without being rejected.
    fn available_input(&self) -> usize;

    /// Write a block of interleaved samples.
    ///
    /// # Returns
    /// Samples accepted. Writing more than [`available_input`](Self::available_input)
    /// is rejected and counted as an overflow.
    fn write(&mut self, samples: &[f32]) -> Result<usize, SinkError>;

    fn start(&mut self) -> Result<(), SinkError>;

    fn stop(&mut self) -> Result<(), SinkError>;

    fn is_running(&self) -> bool;

    /// Capacity of the sink's own queue in samples.
    fn buffer_size(&self) -> usize;

    /// Total samples accepted since creation.
    fn position(&self) -> u64;

    fn underflows(&self) -> u64;

    fn overflows(&self) -> u64;
}

impl<T: MixerSink + ?Sized> MixerSink for Box<T> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn format(&self) -> PcmFormat {
        (**self).format()
    }

    fn available_input(&self) -> usize {
        (**self).available_input()
    }

    fn write(&mut self, samples: &[f32]) -> Result<usize, SinkError> {
        (**self).write(samples)
    }

    fn start(&mut self) -> Result<(), SinkError> {
        (**self).start()
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        (**self).stop()
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }

    fn buffer_size(&self) -> usize {
        (**self).buffer_size()
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn underflows(&self) -> u64 {
        (**self).underflows()
    }

    fn overflows(&self) -> u64 {
        (**self).overflows()
    }
}

/// Sample and error counters shared between a sink and its consumers.
#[derive(Debug, Clone, Default)]
pub struct SinkCounters {
    inner: Arc<CounterCells>,
}

#[derive(Debug, Default)]
struct CounterCells {
    position: AtomicU64,
    underflows: AtomicU64,
    overflows: AtomicU64,
}

/// Point-in-time copy of a sink's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SinkStats {
    pub position: u64,
    pub underflows: u64,
    pub overflows: u64,
}

impl SinkCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_position(&self, samples: usize) {
        self.inner
            .position
            .fetch_add(samples as u64, Ordering::Relaxed);
    }

    pub fn record_underflow(&self) {
        self.inner.underflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overflow(&self) {
        self.inner.overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn position(&self) -> u64 {
        self.inner.position.load(Ordering::Relaxed)
    }

    pub fn underflows(&self) -> u64 {
        self.inner.underflows.load(Ordering::Relaxed)
    }

    pub fn overflows(&self) -> u64 {
        self.inner.overflows.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> SinkStats {
        SinkStats {
            position: self.position(),
            underflows: self.underflows(),
            overflows: self.overflows(),
        }
    }
}
