//! Time-paced silence generator.

use std::time::Instant;

use crate::audio::format::PcmFormat;
use crate::audio::source::{AudioSource, MixerChannel};
use crate::error::ChannelError;
use crate::tools::clock::{Clock, SystemClock};

/// Channel that yields zeros at real-time pace until closed.
///
/// Keeping one of these in the mixer holds it in the playing state, so sinks
/// receive a continuous stream even when no other channel has content.
pub struct SilenceChannel<C: Clock = SystemClock> {
    format: PcmFormat,
    clock: C,
    start: Instant,
    sent: u64,
    closed: bool,
}

impl SilenceChannel<SystemClock> {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self::with_clock(sample_rate, channels, SystemClock)
    }
}

impl<C: Clock> SilenceChannel<C> {
    /// Build a generator that measures elapsed time on `clock`.
    pub fn with_clock(sample_rate: u32, channels: u16, clock: C) -> Self {
        let start = clock.now();
        Self {
            format: PcmFormat::float(sample_rate, channels),
            clock,
            start,
            sent: 0,
            closed: false,
        }
    }

    fn due(&self) -> u64 {
        let elapsed = self.clock.now().saturating_duration_since(self.start);
        let frames = (self.format.sample_rate as f64 * elapsed.as_secs_f64()).floor() as u64;
        frames * self.format.channels as u64
    }
}

impl<C: Clock> AudioSource for SilenceChannel<C> {
    fn available(&self) -> usize {
        if self.closed {
            return 0;
        }
        self.due().saturating_sub(self.sent) as usize
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize, ChannelError> {
        let count = out.len().min(self.available());
        out[..count].fill(0.0);
        self.sent += count as u64;
        Ok(count)
    }
}

impl<C: Clock> MixerChannel for SilenceChannel<C> {
    fn name(&self) -> String {
        format!(
            "{}Hz, {}ch Silence",
            self.format.sample_rate, self.format.channels
        )
    }

    fn format(&self) -> PcmFormat {
        self.format
    }

    fn is_playing(&self) -> bool {
        !self.closed
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
