//! Sink that renders mixed audio as raw PCM bytes.

use std::io::Write;
use std::str::FromStr;

use log::debug;

use super::{MixerSink, SinkCounters};
use crate::audio::format::{convert_f32_to_signed_16bit, PcmFormat};
use crate::error::{FormatError, SinkError};

/// Byte layout written by a [`WriterSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PcmOutput {
    /// 32-bit float, little endian.
    #[default]
    F32,
    /// 16-bit signed integer, little endian.
    S16,
}

impl FromStr for PcmOutput {
    type Err = FormatError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "f32" | "f32le" | "float" => Ok(PcmOutput::F32),
            "s16" | "s16le" | "i16" => Ok(PcmOutput::S16),
            other => Err(FormatError::UnsupportedEncoding(other.to_string())),
        }
    }
}

/// Writes every accepted block to `W` as interleaved PCM.
pub struct WriterSink<W: Write + Send> {
    name: String,
    writer: W,
    format: PcmFormat,
    output: PcmOutput,
    buffer_size: usize,
    running: bool,
    bytes: Vec<u8>,
    counters: SinkCounters,
}

impl<W: Write + Send> WriterSink<W> {
    /// # Arguments
    /// - `buffer_size`: Largest block accepted per write, in samples.
    pub fn new(
        name: impl Into<String>,
        writer: W,
        format: PcmFormat,
        output: PcmOutput,
        buffer_size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            writer,
            format,
            output,
            buffer_size,
            running: false,
            bytes: Vec::new(),
            counters: SinkCounters::new(),
        }
    }

    pub fn counters(&self) -> SinkCounters {
        self.counters.clone()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn encode(&mut self, samples: &[f32]) {
        self.bytes.clear();
        match self.output {
            PcmOutput::F32 => {
                for sample in samples {
                    self.bytes.extend_from_slice(&sample.to_le_bytes());
                }
            }
            PcmOutput::S16 => {
                for &sample in samples {
                    self.bytes
                        .extend_from_slice(&convert_f32_to_signed_16bit(sample).to_le_bytes());
                }
            }
        }
    }
}

impl<W: Write + Send> MixerSink for WriterSink<W> {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn format(&self) -> PcmFormat {
        self.format
    }

    fn available_input(&self) -> usize {
        if self.running {
            self.buffer_size
        } else {
            0
        }
    }

    fn write(&mut self, samples: &[f32]) -> Result<usize, SinkError> {
        if !self.running {
            return Err(SinkError::NotRunning);
        }
        if samples.len() > self.buffer_size {
            self.counters.record_overflow();
            return Err(SinkError::Rejected {
                requested: samples.len(),
                available: self.buffer_size,
            });
        }
        self.encode(samples);
        self.writer.write_all(&self.bytes)?;
        self.counters.add_position(samples.len());
        Ok(samples.len())
    }

    fn start(&mut self) -> Result<(), SinkError> {
        self.running = true;
        debug!("{}: started", self.name);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        self.running = false;
        self.writer.flush()?;
        debug!("{}: stopped after {} samples", self.name, self.counters.position());
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
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
