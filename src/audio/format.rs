//! PCM format descriptions and native-to-float sample conversion.

use serde::{Deserialize, Serialize};

use crate::error::FormatError;

/// Native representation of one PCM sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleEncoding {
    U8,
    S16Le,
    S16Be,
    S24Le,
    S24Be,
    S32Le,
    S32Be,
    F32Le,
}

impl SampleEncoding {
    /// Size of one sample in bytes.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleEncoding::U8 => 1,
            SampleEncoding::S16Le | SampleEncoding::S16Be => 2,
            SampleEncoding::S24Le | SampleEncoding::S24Be => 3,
            SampleEncoding::S32Le | SampleEncoding::S32Be | SampleEncoding::F32Le => 4,
        }
    }

    /// Bit depth of the encoding.
    pub fn bits(self) -> u32 {
        self.bytes_per_sample() as u32 * 8
    }

    /// Returns `true` when samples are already canonical floats.
    pub fn is_float(self) -> bool {
        matches!(self, SampleEncoding::F32Le)
    }

    /// Parse a short name such as `s16le` or `f32`.
    pub fn from_name(name: &str) -> Result<Self, FormatError> {
        match name.to_ascii_lowercase().as_str() {
            "u8" => Ok(SampleEncoding::U8),
            "s16" | "s16le" => Ok(SampleEncoding::S16Le),
            "s16be" => Ok(SampleEncoding::S16Be),
            "s24" | "s24le" => Ok(SampleEncoding::S24Le),
            "s24be" => Ok(SampleEncoding::S24Be),
            "s32" | "s32le" => Ok(SampleEncoding::S32Le),
            "s32be" => Ok(SampleEncoding::S32Be),
            "f32" | "f32le" => Ok(SampleEncoding::F32Le),
            other => Err(FormatError::UnsupportedEncoding(other.to_string())),
        }
    }

    /// Decode raw bytes into canonical floats, appending to `out`.
    ///
    /// # Arguments
    /// - `bytes`: Interleaved native samples. Must hold whole samples.
    /// - `out`: Destination for the converted samples.
    ///
    /// # Returns
    /// Number of samples appended.
    pub fn decode_into(self, bytes: &[u8], out: &mut Vec<f32>) -> Result<usize, FormatError> {
        let width = self.bytes_per_sample();
        if bytes.len() % width != 0 {
            return Err(FormatError::Misaligned {
                len: bytes.len(),
                bytes_per_sample: width,
            });
        }

        let count = bytes.len() / width;
        out.reserve(count);
        for chunk in bytes.chunks_exact(width) {
            let sample = match self {
                SampleEncoding::U8 => convert_unsigned_8bit_to_f32(chunk[0]),
                SampleEncoding::S16Le => {
                    convert_signed_16bit_to_f32(i16::from_le_bytes([chunk[0], chunk[1]]))
                }
                SampleEncoding::S16Be => {
                    convert_signed_16bit_to_f32(i16::from_be_bytes([chunk[0], chunk[1]]))
                }
                SampleEncoding::S24Le => convert_signed_24bit_to_f32(
                    chunk[0] as i32 | (chunk[1] as i32) << 8 | (chunk[2] as i32) << 16,
                ),
                SampleEncoding::S24Be => convert_signed_24bit_to_f32(
                    chunk[2] as i32 | (chunk[1] as i32) << 8 | (chunk[0] as i32) << 16,
                ),
                SampleEncoding::S32Le => convert_signed_32bit_to_f32(i32::from_le_bytes([
                    chunk[0], chunk[1], chunk[2], chunk[3],
                ])),
                SampleEncoding::S32Be => convert_signed_32bit_to_f32(i32::from_be_bytes([
                    chunk[0], chunk[1], chunk[2], chunk[3],
                ])),
                SampleEncoding::F32Le => {
                    f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
                }
            };
            out.push(sample);
        }

        Ok(count)
    }
}

/// Convert an unsigned 8-bit sample to `f32`.
pub fn convert_unsigned_8bit_to_f32(sample: u8) -> f32 {
    (sample as i16 - 128) as f32 / 2f32.powi(7)
}

/// Convert a signed 16-bit sample to `f32`.
pub fn convert_signed_16bit_to_f32(sample: i16) -> f32 {
    sample as f32 / 2f32.powi(15)
}

/// Convert a signed 24-bit sample stored in the low bits of an `i32` to `f32`.
pub fn convert_signed_24bit_to_f32(sample: i32) -> f32 {
    let shifted_sample = sample << 8 >> 8;
    shifted_sample as f32 / 2f32.powi(23)
}

/// Convert a signed 32-bit sample to `f32`.
pub fn convert_signed_32bit_to_f32(sample: i32) -> f32 {
    sample as f32 / 2f32.powi(31)
}

/// Convert a float sample to signed 16-bit, saturating out-of-range input.
pub fn convert_f32_to_signed_16bit(sample: f32) -> i16 {
    let scaled = (sample * 2f32.powi(15)).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Sample rate, channel count and native encoding of a PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub encoding: SampleEncoding,
}

impl PcmFormat {
    pub fn new(sample_rate: u32, channels: u16, encoding: SampleEncoding) -> Self {
        Self {
            sample_rate,
            channels,
            encoding,
        }
    }

    /// Canonical float format used inside the mixer.
    pub fn float(sample_rate: u32, channels: u16) -> Self {
        Self::new(sample_rate, channels, SampleEncoding::F32Le)
    }

    /// Reject formats with zero channels or a zero sample rate.
    pub fn validate(&self) -> Result<(), FormatError> {
        if self.channels == 0 {
            return Err(FormatError::InvalidChannels(self.channels));
        }
        if self.sample_rate == 0 {
            return Err(FormatError::InvalidSampleRate(self.sample_rate));
        }
        Ok(())
    }

    /// Returns `true` when rate and channel count match, ignoring encoding.
    pub fn same_layout(&self, other: &PcmFormat) -> bool {
        self.sample_rate == other.sample_rate && self.channels == other.channels
    }

    /// Interleaved samples per second of audio.
    pub fn samples_per_second(&self) -> u64 {
        self.sample_rate as u64 * self.channels as u64
    }

    /// Duration of `samples` interleaved samples in seconds.
    pub fn seconds_for_samples(&self, samples: u64) -> f64 {
        let per_second = self.samples_per_second();
        if per_second == 0 {
            return 0.0;
        }
        samples as f64 / per_second as f64
    }
}

impl std::fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}Hz {}ch {:?}",
            self.sample_rate, self.channels, self.encoding
        )
    }
}
