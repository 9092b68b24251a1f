//! Time sources for pacing.
//!
//! [`SystemClock`] follows the wall clock. [`ManualClock`] only moves when
//! told to (or when something sleeps on it), which makes silence generation
//! and scheduler cadence testable without real sleeps.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Monotonic time source with a blocking sleep.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Block until `deadline`. Returns immediately when it already passed.
    fn sleep_until(&self, deadline: Instant);
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, deadline: Instant) {
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        }
    }
}

/// Deterministic clock for tests and offline rendering.
///
/// Cloned handles share one timeline. `sleep_until` jumps straight to the
/// deadline and records how long the caller asked to sleep.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Debug)]
struct ManualState {
    now: Instant,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualState {
                now: Instant::now(),
                sleeps: Vec::new(),
            })),
        }
    }

    /// Move time forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        state.now += by;
    }

    /// Durations passed to `sleep_until`, in call order. Deadlines that had
    /// already passed are not recorded.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.lock().now
    }

    fn sleep_until(&self, deadline: Instant) {
        let mut state = self.lock();
        if deadline > state.now {
            let slept = deadline - state.now;
            state.sleeps.push(slept);
            state.now = deadline;
        }
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep_until(&self, deadline: Instant) {
        (**self).sleep_until(deadline)
    }
}
