//! Decoder-backed player.

use log::debug;

use super::{BufferFill, BufferedPlayer};
use crate::audio::format::PcmFormat;
use crate::audio::ring_buffer::RingBuffer;
use crate::decode::FrameDecoder;
use crate::error::{BufferError, ChannelError};

/// Fills a player's buffer one decoded frame at a time.
///
/// A frame bigger than the free space is written partially. The rest is
/// carried and written before the next frame is decoded.
pub struct DecoderFill {
    decoder: Box<dyn FrameDecoder>,
    format: PcmFormat,
    name: String,
    carry: Vec<f32>,
    eof: bool,
    closed: bool,
}

impl DecoderFill {
    pub fn new(decoder: Box<dyn FrameDecoder>) -> Self {
        let native = decoder.format();
        let format = PcmFormat::float(native.sample_rate, native.channels);
        let name = decoder.describe();
        Self {
            decoder,
            format,
            name,
            carry: Vec::new(),
            eof: false,
            closed: false,
        }
    }

    fn write_carry(&mut self, buffer: &mut RingBuffer) -> Result<(), ChannelError> {
        let count = self.carry.len().min(buffer.available_input());
        buffer.write(&self.carry[..count])?;
        self.carry.drain(..count);
        Ok(())
    }
}

impl BufferFill for DecoderFill {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn format(&self) -> PcmFormat {
        self.format
    }

    fn process_buffer(&mut self, buffer: &mut RingBuffer) -> Result<bool, ChannelError> {
        if self.closed {
            return Ok(false);
        }

        if !self.carry.is_empty() {
            self.write_carry(buffer)?;
            return Ok(true);
        }

        if self.eof {
            return Ok(false);
        }

        match self.decoder.next_frame()? {
            None => {
                debug!("{}: end of stream", self.name);
                self.eof = true;
                Ok(false)
            }
            Some(frame) => {
                if !frame.is_empty() {
                    self.carry = frame;
                    self.write_carry(buffer)?;
                }
                Ok(true)
            }
        }
    }

    fn is_playing(&self, buffer: &RingBuffer) -> bool {
        !self.closed && (!self.eof || !self.carry.is_empty() || buffer.available_output() > 0)
    }

    fn stop(&mut self, _buffer: &mut RingBuffer) -> bool {
        self.close();
        true
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.eof = true;
            self.carry.clear();
        }
    }
}

/// Player that decodes on demand into its ring buffer.
pub type DecoderPlayer = BufferedPlayer<DecoderFill>;

impl BufferedPlayer<DecoderFill> {
    /// Player over `decoder` with a buffer of `buffer_size` samples.
    pub fn from_decoder(
        decoder: impl FrameDecoder + 'static,
        buffer_size: usize,
    ) -> Result<Self, BufferError> {
        BufferedPlayer::new(DecoderFill::new(Box::new(decoder)), buffer_size)
    }
}
