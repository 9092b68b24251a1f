//! Buffered players.
//!
//! A [`BufferedPlayer`] owns a [`RingBuffer`] and a source-specific
//! [`BufferFill`] strategy. Reads drain the ring buffer and only call back
//! into the fill strategy when it runs dry, so decode latency is hidden
//! behind whatever the buffer already holds.
//!
//! Buffer and fill strategy sit behind one mutex, which serializes the
//! producer and consumer sides and lets a [`PlayerControl`] stop or close the
//! player from any thread.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::audio::format::PcmFormat;
use crate::audio::ring_buffer::RingBuffer;
use crate::audio::source::{AudioSource, MixerChannel};
use crate::error::{BufferError, ChannelError};

pub mod decoder;
pub mod resampled;

pub use decoder::{DecoderFill, DecoderPlayer};
pub use resampled::{ResampleFill, ResampledPlayer};

/// A mixer channel that can be stopped gracefully or killed.
pub trait Player: MixerChannel {
    /// Ask the player to wind down. Buffered output may still play out.
    ///
    /// # Returns
    /// `true` if the player will stop or has begun stopping.
    fn stop(&mut self) -> bool;

    /// Stop immediately and release resources.
    fn kill(&mut self) -> bool {
        self.close();
        true
    }
}

/// Source-specific strategy for refilling a player's buffer.
pub trait BufferFill: Send {
    fn name(&self) -> String;

    /// Format of the samples written into the buffer.
    fn format(&self) -> PcmFormat;

    /// Pull more data into `buffer`.
    ///
    /// # Returns
    /// `Ok(false)` when nothing more can be produced right now, including
    /// every call after end of source.
    fn process_buffer(&mut self, buffer: &mut RingBuffer) -> Result<bool, ChannelError>;

    /// `true` while any sample may still be produced.
    fn is_playing(&self, buffer: &RingBuffer) -> bool;

    /// Graceful stop. See [`Player::stop`].
    fn stop(&mut self, buffer: &mut RingBuffer) -> bool;

    fn close(&mut self);
}

struct PlayerState<F> {
    buffer: RingBuffer,
    fill: F,
}

/// Ring-buffered player around a fill strategy.
pub struct BufferedPlayer<F: BufferFill> {
    state: Arc<Mutex<PlayerState<F>>>,
    buffer_size: usize,
}

impl<F: BufferFill + 'static> BufferedPlayer<F> {
    /// Wrap `fill` with a buffer of `buffer_size` samples.
    ///
    /// Fails with [`BufferError::ZeroCapacity`] when `buffer_size` is zero.
    pub fn new(fill: F, buffer_size: usize) -> Result<Self, BufferError> {
        if buffer_size == 0 {
            return Err(BufferError::ZeroCapacity);
        }
        Ok(Self {
            state: Arc::new(Mutex::new(PlayerState {
                buffer: RingBuffer::new(buffer_size),
                fill,
            })),
            buffer_size,
        })
    }

    /// Thread-safe handle for stopping or closing this player.
    pub fn control(&self) -> PlayerControl {
        PlayerControl {
            target: self.state.clone(),
        }
    }
}

impl<F: BufferFill> BufferedPlayer<F> {
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn lock(&self) -> MutexGuard<'_, PlayerState<F>> {
        lock_state(&self.state)
    }
}

fn lock_state<F>(state: &Mutex<PlayerState<F>>) -> MutexGuard<'_, PlayerState<F>> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<F: BufferFill> AudioSource for BufferedPlayer<F> {
    fn available(&self) -> usize {
        let state = self.lock();
        if state.fill.is_playing(&state.buffer) {
            state.buffer.capacity()
        } else {
            state.buffer.available_output()
        }
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize, ChannelError> {
        let mut state = self.lock();
        let PlayerState { buffer, fill } = &mut *state;

        let mut pos = 0;
        let mut more = true;
        while pos < out.len() {
            while more && buffer.available_output() == 0 {
                more = fill.process_buffer(buffer)?;
            }
            if buffer.available_output() == 0 {
                break;
            }
            pos += buffer.read(&mut out[pos..]);
        }
        Ok(pos)
    }
}

impl<F: BufferFill> MixerChannel for BufferedPlayer<F> {
    fn name(&self) -> String {
        self.lock().fill.name()
    }

    fn format(&self) -> PcmFormat {
        self.lock().fill.format()
    }

    fn is_playing(&self) -> bool {
        let state = self.lock();
        state.fill.is_playing(&state.buffer)
    }

    fn close(&mut self) {
        close_state(&self.state);
    }
}

impl<F: BufferFill> Player for BufferedPlayer<F> {
    fn stop(&mut self) -> bool {
        stop_state(&self.state)
    }
}

fn stop_state<F: BufferFill>(state: &Mutex<PlayerState<F>>) -> bool {
    let mut state = lock_state(state);
    let PlayerState { buffer, fill } = &mut *state;
    fill.stop(buffer)
}

fn close_state<F: BufferFill>(state: &Mutex<PlayerState<F>>) {
    let mut state = lock_state(state);
    state.fill.close();
    state.buffer.clear();
}

trait SharedPlayer: Send + Sync {
    fn stop(&self) -> bool;
    fn close(&self);
    fn is_playing(&self) -> bool;
    fn name(&self) -> String;
}

impl<F: BufferFill> SharedPlayer for Mutex<PlayerState<F>> {
    fn stop(&self) -> bool {
        stop_state(self)
    }

    fn close(&self) {
        close_state(self)
    }

    fn is_playing(&self) -> bool {
        let state = lock_state(self);
        state.fill.is_playing(&state.buffer)
    }

    fn name(&self) -> String {
        lock_state(self).fill.name()
    }
}

/// Cloneable remote control for a player that has been handed to a mixer.
#[derive(Clone)]
pub struct PlayerControl {
    target: Arc<dyn SharedPlayer>,
}

impl PlayerControl {
    pub fn stop(&self) -> bool {
        self.target.stop()
    }

    pub fn close(&self) {
        self.target.close()
    }

    pub fn is_playing(&self) -> bool {
        self.target.is_playing()
    }

    pub fn name(&self) -> String {
        self.target.name()
    }
}

impl std::fmt::Debug for PlayerControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerControl")
            .field("name", &self.name())
            .field("playing", &self.is_playing())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fill that produces `remaining` blocks of `[1.0, 2.0, 3.0]`.
    struct Blocks {
        remaining: usize,
        closed: bool,
    }

    impl BufferFill for Blocks {
        fn name(&self) -> String {
            "blocks".to_string()
        }

        fn format(&self) -> PcmFormat {
            PcmFormat::float(48_000, 1)
        }

        fn process_buffer(&mut self, buffer: &mut RingBuffer) -> Result<bool, ChannelError> {
            if self.closed || self.remaining == 0 {
                return Ok(false);
            }
            self.remaining -= 1;
            buffer.write(&[1.0, 2.0, 3.0])?;
            Ok(true)
        }

        fn is_playing(&self, buffer: &RingBuffer) -> bool {
            !self.closed && (self.remaining > 0 || buffer.available_output() > 0)
        }

        fn stop(&mut self, _buffer: &mut RingBuffer) -> bool {
            self.close();
            true
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[test]
    fn read_spans_multiple_fills() {
        let mut player = BufferedPlayer::new(
            Blocks {
                remaining: 3,
                closed: false,
            },
            8,
        )
        .expect("player");
        let mut out = [0.0; 7];
        assert_eq!(player.read(&mut out).expect("read"), 7);
        assert_eq!(out, [1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0]);
        assert!(player.is_playing());
    }

    #[test]
    fn short_read_at_end_of_source() {
        let mut player = BufferedPlayer::new(
            Blocks {
                remaining: 1,
                closed: false,
            },
            8,
        )
        .expect("player");
        assert_eq!(player.available(), 8);

        let mut out = [0.0; 5];
        assert_eq!(player.read(&mut out).expect("read"), 3);
        assert!(!player.is_playing());
        assert_eq!(player.available(), 0);
        assert_eq!(player.read(&mut out).expect("read after end"), 0);
    }

    #[test]
    fn control_closes_from_another_thread() {
        let player = BufferedPlayer::new(
            Blocks {
                remaining: 100,
                closed: false,
            },
            8,
        )
        .expect("player");
        let control = player.control();
        std::thread::spawn(move || control.close())
            .join()
            .expect("join");
        assert!(!player.is_playing());
        assert_eq!(player.name(), "blocks");
    }

    #[test]
    fn zero_sized_buffer_is_rejected() {
        let result = BufferedPlayer::new(
            Blocks {
                remaining: 1,
                closed: false,
            },
            0,
        );
        assert!(matches!(result, Err(BufferError::ZeroCapacity)));
    }

    #[test]
    fn kill_drops_buffered_output() {
        let mut player = BufferedPlayer::new(
            Blocks {
                remaining: 5,
                closed: false,
            },
            8,
        )
        .expect("player");
        let mut out = [0.0; 2];
        assert_eq!(player.read(&mut out).expect("read"), 2);
        assert!(player.is_playing());

        assert!(player.kill());
        assert!(!player.is_playing());
        assert_eq!(player.read(&mut out).expect("read after kill"), 0);
    }
}
