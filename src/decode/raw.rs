//! Headerless interleaved PCM.

use std::io::{ErrorKind, Read};

use log::warn;

use crate::audio::format::PcmFormat;
use crate::decode::FrameDecoder;
use crate::error::DecodeError;

const DEFAULT_FRAME_FRAMES: usize = 960;

/// Decodes raw PCM bytes from any reader in fixed-size frames.
pub struct RawPcmDecoder<R> {
    reader: R,
    format: PcmFormat,
    frame_bytes: usize,
    scratch: Vec<u8>,
    carry: Vec<u8>,
    finished: bool,
    label: String,
}

impl<R: Read + Send> RawPcmDecoder<R> {
    /// Decoder yielding 20 ms frames at 48 kHz (960 sample frames).
    pub fn new(reader: R, format: PcmFormat) -> Result<Self, DecodeError> {
        Self::with_frame_size(reader, format, DEFAULT_FRAME_FRAMES)
    }

    /// Decoder yielding frames of `frames` sample frames each.
    pub fn with_frame_size(reader: R, format: PcmFormat, frames: usize) -> Result<Self, DecodeError> {
        format.validate()?;
        let frame_bytes =
            frames.max(1) * format.channels as usize * format.encoding.bytes_per_sample();
        Ok(Self {
            reader,
            format,
            frame_bytes,
            scratch: vec![0; frame_bytes],
            carry: Vec::new(),
            finished: false,
            label: "raw pcm".to_string(),
        })
    }

    /// Name reported in channel names.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    fn fill(&mut self) -> Result<usize, DecodeError> {
        let mut filled = 0;
        while filled < self.frame_bytes {
            match self.reader.read(&mut self.scratch[filled..]) {
                Ok(0) => break,
                Ok(read) => filled += read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(filled)
    }
}

impl<R: Read + Send> FrameDecoder for RawPcmDecoder<R> {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn next_frame(&mut self) -> Result<Option<Vec<f32>>, DecodeError> {
        if self.finished {
            return Ok(None);
        }

        let read = self.fill()?;
        if read == 0 {
            self.finished = true;
            if !self.carry.is_empty() {
                warn!(
                    "{}: dropping {} trailing bytes of a partial sample",
                    self.label,
                    self.carry.len()
                );
                self.carry.clear();
            }
            return Ok(None);
        }

        self.carry.extend_from_slice(&self.scratch[..read]);
        let width = self.format.encoding.bytes_per_sample();
        let whole = self.carry.len() - self.carry.len() % width;

        let mut samples = Vec::with_capacity(whole / width);
        self.format
            .encoding
            .decode_into(&self.carry[..whole], &mut samples)?;
        self.carry.drain(..whole);
        Ok(Some(samples))
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.label, self.format)
    }
}
