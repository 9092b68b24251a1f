//! Sample-rate and channel-layout conversion.
//!
//! A [`Resampler`] turns interleaved `f32` samples in its input layout into
//! interleaved samples in its output layout. Output that does not fit the
//! destination buffer is kept and written first on the next call, so the
//! caller never has to size its buffer for the worst-case conversion ratio.

use crate::audio::format::PcmFormat;
use crate::audio::ring_buffer::RingBuffer;
use crate::error::ResampleError;

pub mod sinc;

pub use sinc::{SincResampler, SincResamplerFactory};

/// Stateful converter between two PCM formats.
///
/// An instance keeps filter history across calls and must only be driven by
/// one caller at a time.
pub trait Resampler: Send {
    fn input_format(&self) -> PcmFormat;

    fn output_format(&self) -> PcmFormat;

    /// Convert `input` and write as much output as fits into `out`.
    ///
    /// # Arguments
    /// - `input`: Interleaved float samples in the input layout.
    /// - `out`: Destination buffer.
    ///
    /// # Returns
    /// Samples written to `out`. Zero is legitimate while the converter is
    /// still filling its history.
    fn resample(&mut self, input: &[f32], out: &mut RingBuffer) -> Result<usize, ResampleError>;

    /// Convert native-encoded bytes described by
    /// [`input_format`](Self::input_format), then resample them.
    fn resample_raw(&mut self, bytes: &[u8], out: &mut RingBuffer) -> Result<usize, ResampleError> {
        let mut samples = Vec::new();
        self.input_format()
            .encoding
            .decode_into(bytes, &mut samples)?;
        self.resample(&samples, out)
    }

    /// Push retained history through at end of stream.
    ///
    /// # Returns
    /// Samples written to `out`. Anything that did not fit stays pending.
    fn flush(&mut self, out: &mut RingBuffer) -> Result<usize, ResampleError>;

    /// Converted samples waiting for room in a destination buffer.
    fn pending(&self) -> usize;

    /// Release the conversion context. Later calls fail with
    /// [`ResampleError::Closed`].
    fn close(&mut self);
}

/// Creates resamplers for a format pair.
pub trait ResamplerFactory: Send + Sync {
    fn create(
        &self,
        input: PcmFormat,
        output: PcmFormat,
        buffer_size: usize,
    ) -> Result<Box<dyn Resampler>, ResampleError>;
}

/// Map one interleaved frame from `input` channels to `output` channels.
///
/// Downmixing to mono averages every input channel. Any other layout change
/// repeats or drops channels by index.
pub fn remap_frame(frame: &[f32], output: &mut [f32]) {
    let inputs = frame.len();
    if inputs == 0 {
        output.fill(0.0);
        return;
    }
    if output.len() == inputs {
        output.copy_from_slice(frame);
    } else if output.len() == 1 {
        output[0] = frame.iter().sum::<f32>() / inputs as f32;
    } else {
        for (ch, slot) in output.iter_mut().enumerate() {
            *slot = frame[ch % inputs];
        }
    }
}
