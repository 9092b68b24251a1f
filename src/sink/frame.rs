//! Framed sample queue for a transport running on another thread.
//!
//! The mixer side ([`FrameSink`]) pushes whole tick blocks into a bounded
//! ring. The transport side ([`FrameReceiver`]) pulls fixed-size frames out
//! of it, typically one 20 ms frame per encoder packet.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use dasp_ring_buffer::Bounded;
use log::debug;

use super::{MixerSink, SinkCounters};
use crate::audio::format::PcmFormat;
use crate::error::SinkError;

/// Shared queue between a frame sink and its receiver.
pub type FrameQueue = Arc<Mutex<Bounded<Vec<f32>>>>;

fn lock_queue(queue: &FrameQueue) -> MutexGuard<'_, Bounded<Vec<f32>>> {
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Samples in one frame of `frame_ms` milliseconds.
pub fn frame_samples(format: PcmFormat, frame_ms: u32) -> usize {
    let frames = (format.sample_rate as u64 * frame_ms as u64 / 1000).max(1) as usize;
    frames * format.channels.max(1) as usize
}

/// Mixer-facing half of a framed queue.
pub struct FrameSink {
    name: String,
    format: PcmFormat,
    queue: FrameQueue,
    running: Arc<AtomicBool>,
    counters: SinkCounters,
}

/// Transport-facing half of a framed queue.
#[derive(Clone)]
pub struct FrameReceiver {
    format: PcmFormat,
    frame_samples: usize,
    queue: FrameQueue,
    running: Arc<AtomicBool>,
    counters: SinkCounters,
}

impl FrameSink {
    /// Create a linked sink/receiver pair.
    ///
    /// # Arguments
    /// - `format`: Mixer format the queue carries.
    /// - `frame_ms`: Duration of one frame handed to the receiver.
    /// - `frames`: Queue depth in frames.
    pub fn new(
        name: impl Into<String>,
        format: PcmFormat,
        frame_ms: u32,
        frames: usize,
    ) -> (FrameSink, FrameReceiver) {
        let frame_samples = frame_samples(format, frame_ms);
        let capacity = frame_samples * frames.max(1);
        let queue: FrameQueue = Arc::new(Mutex::new(Bounded::from(vec![0.0; capacity])));
        let running = Arc::new(AtomicBool::new(false));
        let counters = SinkCounters::new();

        let sink = FrameSink {
            name: name.into(),
            format,
            queue: queue.clone(),
            running: running.clone(),
            counters: counters.clone(),
        };
        let receiver = FrameReceiver {
            format,
            frame_samples,
            queue,
            running,
            counters,
        };
        (sink, receiver)
    }
}

impl MixerSink for FrameSink {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn format(&self) -> PcmFormat {
        self.format
    }

    fn available_input(&self) -> usize {
        let queue = lock_queue(&self.queue);
        queue.max_len().saturating_sub(queue.len())
    }

    fn write(&mut self, samples: &[f32]) -> Result<usize, SinkError> {
        let mut queue = lock_queue(&self.queue);
        let available = queue.max_len().saturating_sub(queue.len());
        if samples.len() > available {
            self.counters.record_overflow();
            return Err(SinkError::Rejected {
                requested: samples.len(),
                available,
            });
        }
        for &sample in samples {
            let _ = queue.push(sample);
        }
        self.counters.add_position(samples.len());
        Ok(samples.len())
    }

    fn start(&mut self) -> Result<(), SinkError> {
        if !self.running.swap(true, Ordering::SeqCst) {
            debug!("{}: started", self.name);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        if self.running.swap(false, Ordering::SeqCst) {
            debug!("{}: stopped", self.name);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn buffer_size(&self) -> usize {
        lock_queue(&self.queue).max_len()
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

impl FrameReceiver {
    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn buffered(&self) -> usize {
        lock_queue(&self.queue).len()
    }

    pub fn counters(&self) -> &SinkCounters {
        &self.counters
    }

    /// Pop one whole frame.
    ///
    /// Returns `None` when less than a frame is queued. While the sink is
    /// running that counts as an underflow.
    pub fn next_frame(&self) -> Option<Vec<f32>> {
        let mut queue = lock_queue(&self.queue);
        if queue.len() < self.frame_samples {
            if self.is_running() {
                self.counters.record_underflow();
            }
            return None;
        }
        let mut frame = Vec::with_capacity(self.frame_samples);
        while frame.len() < self.frame_samples {
            match queue.pop() {
                Some(sample) => frame.push(sample),
                None => break,
            }
        }
        Some(frame)
    }

    /// Pop whatever is left, zero-padded to a whole frame.
    pub fn drain_padded(&self) -> Option<Vec<f32>> {
        let mut queue = lock_queue(&self.queue);
        if queue.is_empty() {
            return None;
        }
        let mut frame = Vec::with_capacity(self.frame_samples);
        while frame.len() < self.frame_samples {
            frame.push(queue.pop().unwrap_or(0.0));
        }
        Some(frame)
    }
}
