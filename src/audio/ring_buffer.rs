//! Fixed-capacity sample storage with compaction on drain.
//!
//! Unread samples always start at index 0. Every drain (`mix` or `read`)
//! moves the leftover samples to the front, so the only cursor is the fill
//! count.

use crate::audio::source::AudioSource;
use crate::error::{BufferError, ChannelError};

/// Bounded float sample buffer used as the unit of backpressure.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    data: Vec<f32>,
    filled: usize,
}

impl RingBuffer {
    /// Create an empty buffer holding up to `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity],
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Samples ready to drain.
    pub fn available_output(&self) -> usize {
        self.filled
    }

    /// Free space in samples.
    pub fn available_input(&self) -> usize {
        self.data.len() - self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Append raw samples.
    ///
    /// Writing more than [`available_input`](Self::available_input) is a
    /// contract violation and leaves the buffer untouched.
    pub fn write(&mut self, samples: &[f32]) -> Result<usize, BufferError> {
        let free = self.available_input();
        if samples.len() > free {
            return Err(BufferError::Overflow {
                requested: samples.len(),
                available: free,
            });
        }

        let end = self.filled + samples.len();
        self.data[self.filled..end].copy_from_slice(samples);
        self.filled = end;
        Ok(samples.len())
    }

    /// Pull up to `max` samples from `source` into free space.
    ///
    /// # Arguments
    /// - `source`: Producer to read from. Only its currently available
    ///   samples are requested.
    /// - `max`: Upper bound on samples to pull. Must not exceed free space.
    ///
    /// # Returns
    /// Number of samples actually written.
    pub fn write_from(
        &mut self,
        source: &mut dyn AudioSource,
        max: usize,
    ) -> Result<usize, ChannelError> {
        let free = self.available_input();
        if max > free {
            return Err(BufferError::Overflow {
                requested: max,
                available: free,
            }
            .into());
        }

        let want = max.min(source.available());
        if want == 0 {
            return Ok(0);
        }

        let start = self.filled;
        let read = source.read(&mut self.data[start..start + want])?;
        self.filled += read.min(want);
        Ok(read.min(want))
    }

    /// Add buffered samples into `out`, then compact.
    ///
    /// # Returns
    /// Number of samples mixed, at most `out.len()`.
    pub fn mix(&mut self, out: &mut [f32]) -> usize {
        let count = out.len().min(self.filled);
        for (dst, src) in out[..count].iter_mut().zip(&self.data[..count]) {
            *dst += *src;
        }
        self.consume(count);
        count
    }

    /// Copy buffered samples into `out`, then compact.
    ///
    /// # Returns
    /// Number of samples read, at most `out.len()`.
    pub fn read(&mut self, out: &mut [f32]) -> usize {
        let count = out.len().min(self.filled);
        out[..count].copy_from_slice(&self.data[..count]);
        self.consume(count);
        count
    }

    /// Drop every buffered sample.
    pub fn clear(&mut self) {
        self.filled = 0;
    }

    fn consume(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.data.copy_within(count..self.filled, 0);
        self.filled -= count;
    }
}
