//! Decoder boundary.
//!
//! A [`FrameDecoder`] hands out one decoded frame at a time as interleaved
//! `f32` samples in the stream's native rate and channel layout. End of
//! stream is `Ok(None)`, never an error.

use crate::audio::format::PcmFormat;
use crate::error::DecodeError;

pub mod media;
pub mod raw;

pub use media::SymphoniaDecoder;
pub use raw::RawPcmDecoder;

/// Pull-based producer of decoded audio frames.
pub trait FrameDecoder: Send {
    /// Native format of the stream. Frames are always `f32`; the encoding
    /// records what the samples were converted from.
    fn format(&self) -> PcmFormat;

    /// Decode the next frame.
    ///
    /// # Returns
    /// - `Ok(Some(samples))`: One frame of interleaved samples. May be empty.
    /// - `Ok(None)`: The stream is exhausted. Further calls keep returning it.
    fn next_frame(&mut self) -> Result<Option<Vec<f32>>, DecodeError>;

    /// Short description used in channel names.
    fn describe(&self) -> String {
        format!("{}", self.format())
    }
}

impl<T: FrameDecoder + ?Sized> FrameDecoder for Box<T> {
    fn format(&self) -> PcmFormat {
        (**self).format()
    }

    fn next_frame(&mut self) -> Result<Option<Vec<f32>>, DecodeError> {
        (**self).next_frame()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
