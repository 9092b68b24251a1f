//! Pull-based source and mixer channel contracts.

use crate::audio::format::PcmFormat;
use crate::error::ChannelError;

/// Non-blocking producer of interleaved float samples.
pub trait AudioSource {
    /// Samples that can be read right now without waiting.
    fn available(&self) -> usize;

    /// Read up to `out.len()` samples into `out`.
    ///
    /// A short read, including zero, is a normal end-of-stream signal and
    /// not an error.
    fn read(&mut self, out: &mut [f32]) -> Result<usize, ChannelError>;
}

/// An input the mixer can sum into its output.
pub trait MixerChannel: AudioSource + Send {
    /// Human-readable name used in log lines.
    fn name(&self) -> String;

    /// Sample rate and channel count of the samples this channel yields.
    fn format(&self) -> PcmFormat;

    /// `false` once the channel has nothing more to contribute.
    fn is_playing(&self) -> bool;

    /// Release any decoder or resampler resources held by the channel.
    fn close(&mut self);
}

impl<T: AudioSource + ?Sized> AudioSource for Box<T> {
    fn available(&self) -> usize {
        (**self).available()
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize, ChannelError> {
        (**self).read(out)
    }
}

impl<T: MixerChannel + ?Sized> MixerChannel for Box<T> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn format(&self) -> PcmFormat {
        (**self).format()
    }

    fn is_playing(&self) -> bool {
        (**self).is_playing()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
