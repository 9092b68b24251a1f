//! Player adapter that converts another player's output format.

use log::{debug, warn};

use super::{BufferFill, BufferedPlayer, Player};
use crate::audio::format::PcmFormat;
use crate::audio::ring_buffer::RingBuffer;
use crate::audio::source::{AudioSource, MixerChannel};
use crate::error::{ChannelError, ResampleError};
use crate::resample::{Resampler, ResamplerFactory};

/// Fills a buffer by reading the inner player and resampling what it yields.
///
/// When the inner player runs out, the resampler is flushed once so its
/// retained history reaches the output before the adapter reports that it
/// has finished.
pub struct ResampleFill {
    inner: Box<dyn Player>,
    resampler: Box<dyn Resampler>,
    scratch: Vec<f32>,
    input_channels: usize,
    flushed: bool,
    closed: bool,
}

impl ResampleFill {
    pub fn new(inner: Box<dyn Player>, resampler: Box<dyn Resampler>, buffer_size: usize) -> Self {
        let input_channels = resampler.input_format().channels.max(1) as usize;
        Self {
            inner,
            resampler,
            scratch: vec![0.0; buffer_size.max(input_channels)],
            input_channels,
            flushed: false,
            closed: false,
        }
    }

    fn flush_into(&mut self, buffer: &mut RingBuffer) -> Result<usize, ResampleError> {
        self.flushed = true;
        let written = self.resampler.flush(buffer)?;
        debug!(
            "{}: resampler flushed, {} samples written, {} pending",
            self.inner.name(),
            written,
            self.resampler.pending()
        );
        Ok(written)
    }
}

impl BufferFill for ResampleFill {
    fn name(&self) -> String {
        format!("{} -> {}", self.inner.name(), self.resampler.output_format())
    }

    fn format(&self) -> PcmFormat {
        self.resampler.output_format()
    }

    fn process_buffer(&mut self, buffer: &mut RingBuffer) -> Result<bool, ChannelError> {
        if self.closed {
            return Ok(false);
        }

        let mut written = 0;
        if self.resampler.pending() > 0 {
            written += self.resampler.resample(&[], buffer)?;
            if buffer.available_input() == 0 {
                return Ok(true);
            }
        }

        if self.flushed {
            return Ok(written > 0);
        }

        let mut want = buffer
            .available_input()
            .min(self.inner.available())
            .min(self.scratch.len());
        want -= want % self.input_channels;

        let read = if want > 0 {
            self.inner.read(&mut self.scratch[..want])?
        } else {
            0
        };

        if read == 0 {
            if !self.inner.is_playing() {
                written += self.flush_into(buffer)?;
                return Ok(written > 0 || self.resampler.pending() > 0);
            }
            return Ok(written > 0);
        }

        self.resampler.resample(&self.scratch[..read], buffer)?;
        Ok(true)
    }

    fn is_playing(&self, buffer: &RingBuffer) -> bool {
        !self.closed
            && (!self.flushed
                || self.inner.is_playing()
                || self.resampler.pending() > 0
                || buffer.available_output() > 0)
    }

    fn stop(&mut self, buffer: &mut RingBuffer) -> bool {
        let stopped = self.inner.stop();
        if stopped && !self.flushed && !self.inner.is_playing() {
            if let Err(err) = self.flush_into(buffer) {
                warn!("{}: flush on stop failed: {}", self.inner.name(), err);
            }
        }
        stopped
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.inner.close();
            self.resampler.close();
        }
    }
}

/// Player whose output is resampled into a target format.
pub type ResampledPlayer = BufferedPlayer<ResampleFill>;

impl BufferedPlayer<ResampleFill> {
    /// Wrap `player` so it yields `output` samples.
    ///
    /// # Arguments
    /// - `player`: Source player in any rate and channel layout.
    /// - `factory`: Creates the resampling context.
    /// - `output`: Target rate and channel count. The encoding is always float.
    /// - `buffer_size`: Capacity in samples of the adapter's own buffer.
    pub fn wrap(
        player: impl Player + 'static,
        factory: &dyn ResamplerFactory,
        output: PcmFormat,
        buffer_size: usize,
    ) -> Result<Self, ResampleError> {
        let input = player.format();
        let output = PcmFormat::float(output.sample_rate, output.channels);
        let resampler = factory.create(input, output, buffer_size)?;
        debug!("resampling {} from {} to {}", player.name(), input, output);
        Ok(BufferedPlayer::new(
            ResampleFill::new(Box::new(player), resampler, buffer_size),
            buffer_size,
        )?)
    }
}
