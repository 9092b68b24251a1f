//! Local playback through rodio.

use log::debug;
use rodio::buffer::SamplesBuffer;
use rodio::Sink;

use super::{MixerSink, SinkCounters};
use crate::audio::format::PcmFormat;
use crate::error::SinkError;

/// Queues each mixed block on a rodio [`Sink`] as one [`SamplesBuffer`].
///
/// The caller keeps the `OutputStream` the sink is connected to alive for
/// as long as this sink is in use.
pub struct RodioSink {
    sink: Sink,
    format: PcmFormat,
    block_samples: usize,
    max_blocks: usize,
    running: bool,
    counters: SinkCounters,
}

impl RodioSink {
    /// # Arguments
    /// - `sink`: A rodio sink connected to an open output stream.
    /// - `block_samples`: Largest block accepted per write.
    /// - `max_blocks`: Blocks queued on the device before writes back off.
    pub fn new(sink: Sink, format: PcmFormat, block_samples: usize, max_blocks: usize) -> Self {
        sink.pause();
        Self {
            sink,
            format,
            block_samples,
            max_blocks: max_blocks.max(1),
            running: false,
            counters: SinkCounters::new(),
        }
    }

    pub fn counters(&self) -> SinkCounters {
        self.counters.clone()
    }
}

impl MixerSink for RodioSink {
    fn name(&self) -> String {
        format!("local output ({})", self.format)
    }

    fn format(&self) -> PcmFormat {
        self.format
    }

    fn available_input(&self) -> usize {
        let queued = self.sink.len();
        self.max_blocks.saturating_sub(queued) * self.block_samples
    }

    fn write(&mut self, samples: &[f32]) -> Result<usize, SinkError> {
        let available = self.available_input();
        if samples.len() > available {
            self.counters.record_overflow();
            return Err(SinkError::Rejected {
                requested: samples.len(),
                available,
            });
        }
        if self.running && self.sink.empty() && self.counters.position() > 0 {
            self.counters.record_underflow();
        }
        let buffer = SamplesBuffer::new(
            self.format.channels,
            self.format.sample_rate,
            samples.to_vec(),
        );
        self.sink.append(buffer);
        self.counters.add_position(samples.len());
        Ok(samples.len())
    }

    fn start(&mut self) -> Result<(), SinkError> {
        self.sink.play();
        self.running = true;
        debug!("{}: started", self.name());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        self.sink.pause();
        self.running = false;
        debug!("{}: paused", self.name());
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn buffer_size(&self) -> usize {
        self.block_samples * self.max_blocks
    }

    fn position(&self) -> u64 {
        self.counters.position()
    }

    fn underflows(&self) -> u64 {
        self.counters.underflows()
    }

    fn overflows(&self) -> u64 {
        self.counters.overflows()
    }
}
