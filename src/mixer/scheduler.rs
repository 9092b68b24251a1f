//! Periodic driver for mixing ticks.
//!
//! The scheduler ticks at its active rate while the mixer has channels and
//! polls at its idle rate otherwise. Deadlines are accumulated from the
//! first cycle rather than re-read from the clock, so a late tick shortens
//! the next sleep instead of shifting every later tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, info};

use super::Mixer;
use crate::error::MixerError;
use crate::tools::clock::{Clock, SystemClock};

/// The slice of mixer behaviour the scheduler relies on.
pub trait MixDriver {
    /// Apply queued registry changes.
    fn apply_commands(&mut self) -> usize;

    fn is_playing(&self) -> bool;

    fn is_running(&self) -> bool;

    fn set_running(&mut self, running: bool) -> bool;

    /// One tick. `Ok(false)` once nothing is left to play.
    fn process_buffer(&mut self) -> Result<bool, MixerError>;
}

impl MixDriver for Mixer {
    fn apply_commands(&mut self) -> usize {
        Mixer::apply_commands(self)
    }

    fn is_playing(&self) -> bool {
        Mixer::is_playing(self)
    }

    fn is_running(&self) -> bool {
        Mixer::is_running(self)
    }

    fn set_running(&mut self, running: bool) -> bool {
        Mixer::set_running(self, running)
    }

    fn process_buffer(&mut self) -> Result<bool, MixerError> {
        Mixer::process_buffer(self)
    }
}

/// Active and idle tick periods.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scheduler {
    active: Duration,
    idle: Duration,
}

impl Scheduler {
    /// # Arguments
    /// - `active_hz`: Tick rate while channels are playing.
    /// - `idle_hz`: Poll rate while the mixer is empty.
    pub fn new(active_hz: f64, idle_hz: f64) -> Result<Self, MixerError> {
        if !(active_hz.is_finite() && active_hz > 0.0) {
            return Err(MixerError::InvalidParameters(format!(
                "active rate must be positive, got {}",
                active_hz
            )));
        }
        if !(idle_hz.is_finite() && idle_hz > 0.0) {
            return Err(MixerError::InvalidParameters(format!(
                "idle rate must be positive, got {}",
                idle_hz
            )));
        }
        Ok(Self {
            active: Duration::from_secs_f64(1.0 / active_hz),
            idle: Duration::from_secs_f64(1.0 / idle_hz),
        })
    }

    pub fn active_period(&self) -> Duration {
        self.active
    }

    pub fn idle_period(&self) -> Duration {
        self.idle
    }

    /// Drive `driver` until `stop` is set or a tick fails.
    ///
    /// `stop` is checked once per cycle. A failed tick is logged and ends
    /// the loop; it is not retried.
    pub fn run<M, C>(&self, driver: &mut M, clock: &C, stop: &AtomicBool) -> Result<(), MixerError>
    where
        M: MixDriver + ?Sized,
        C: Clock + ?Sized,
    {
        info!(
            "scheduler started: active every {:?}, idle every {:?}",
            self.active, self.idle
        );
        let mut wake = clock.now();
        while !stop.load(Ordering::Acquire) {
            driver.apply_commands();
            if driver.is_playing() {
                if !driver.is_running() {
                    driver.set_running(true);
                }
                if let Err(err) = driver.process_buffer() {
                    error!("mix tick failed, stopping scheduler: {}", err);
                    return Err(err);
                }
                wake += self.active;
            } else {
                if driver.is_running() {
                    driver.set_running(false);
                }
                wake += self.idle;
            }
            clock.sleep_until(wake);
        }
        info!("scheduler stopped");
        Ok(())
    }

    /// Run on a dedicated `mixer` thread with the wall clock.
    pub fn spawn<M>(self, mixer: M) -> Result<SchedulerHandle<M>, MixerError>
    where
        M: MixDriver + Send + 'static,
    {
        self.spawn_with_clock(mixer, SystemClock)
    }

    pub fn spawn_with_clock<M, C>(self, mut mixer: M, clock: C) -> Result<SchedulerHandle<M>, MixerError>
    where
        M: MixDriver + Send + 'static,
        C: Clock + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let thread = thread::Builder::new()
            .name("mixer".to_string())
            .spawn(move || {
                let result = self.run(&mut mixer, &clock, &thread_stop);
                (mixer, result)
            })
            .map_err(|err| MixerError::Thread(err.to_string()))?;
        Ok(SchedulerHandle { stop, thread })
    }
}

/// Owner of a running scheduler thread.
pub struct SchedulerHandle<M> {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<(M, Result<(), MixerError>)>,
}

impl<M> SchedulerHandle<M> {
    /// Ask the loop to exit after its current cycle.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// `true` once the loop has exited, including after a fatal tick.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Stop the loop and wait for it.
    ///
    /// # Returns
    /// The driver, or the error that ended the loop.
    pub fn join(self) -> Result<M, MixerError> {
        self.stop();
        let (mixer, result) = self
            .thread
            .join()
            .map_err(|_| MixerError::Thread("scheduler thread panicked".to_string()))?;
        result.map(|()| mixer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::tools::clock::ManualClock;

    /// Plays for `ticks` ticks, then raises `stop` after `idle_polls` idle
    /// cycles.
    struct Scripted {
        ticks: usize,
        idle_polls: usize,
        ticked: usize,
        polled: usize,
        running: bool,
        starts: usize,
        stops: usize,
        tick_cost: Option<(ManualClock, Duration)>,
        stop: Arc<AtomicBool>,
    }

    impl Scripted {
        fn new(ticks: usize, idle_polls: usize, stop: Arc<AtomicBool>) -> Self {
            Self {
                ticks,
                idle_polls,
                ticked: 0,
                polled: 0,
                running: false,
                starts: 0,
                stops: 0,
                tick_cost: None,
                stop,
            }
        }
    }

    impl MixDriver for Scripted {
        fn apply_commands(&mut self) -> usize {
            if !self.is_playing() {
                self.polled += 1;
                if self.polled > self.idle_polls {
                    self.stop.store(true, Ordering::Release);
                }
            }
            0
        }

        fn is_playing(&self) -> bool {
            self.ticked < self.ticks
        }

        fn is_running(&self) -> bool {
            self.running
        }

        fn set_running(&mut self, running: bool) -> bool {
            if running {
                self.starts += 1;
            } else {
                self.stops += 1;
            }
            self.running = running;
            true
        }

        fn process_buffer(&mut self) -> Result<bool, MixerError> {
            assert!(self.ticked < self.ticks, "ticked after playback ended");
            self.ticked += 1;
            if let Some((clock, cost)) = &self.tick_cost {
                clock.advance(*cost);
            }
            Ok(self.ticked < self.ticks)
        }
    }

    #[test]
    fn ticks_at_active_rate_then_idles() {
        let stop = Arc::new(AtomicBool::new(false));
        let clock = ManualClock::new();
        let scheduler = Scheduler::new(20.0, 2.0).expect("scheduler");
        let mut scripted = Scripted::new(5, 2, stop.clone());

        scheduler.run(&mut scripted, &clock, &stop).expect("run");

        assert_eq!(scripted.ticked, 5);
        assert_eq!(scripted.starts, 1);
        assert_eq!(scripted.stops, 1);

        let active = Duration::from_millis(50);
        let idle = Duration::from_millis(500);
        assert_eq!(clock.sleeps(), vec![active, active, active, active, active, idle, idle, idle]);
    }

    #[test]
    fn overrunning_ticks_do_not_shift_later_deadlines() {
        let stop = Arc::new(AtomicBool::new(false));
        let clock = ManualClock::new();
        let origin = clock.now();
        let scheduler = Scheduler::new(20.0, 2.0).expect("scheduler");
        let mut scripted = Scripted::new(4, 0, stop.clone());
        scripted.tick_cost = Some((clock.clone(), Duration::from_millis(120)));

        scheduler.run(&mut scripted, &clock, &stop).expect("run");

        // 4 ticks end at 480ms, past every active deadline. The idle
        // deadline is still 4 * 50ms + 500ms from the origin.
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(220)]);
        assert_eq!(clock.now() - origin, Duration::from_millis(700));
    }

    struct Failing;

    impl MixDriver for Failing {
        fn apply_commands(&mut self) -> usize {
            0
        }

        fn is_playing(&self) -> bool {
            true
        }

        fn is_running(&self) -> bool {
            true
        }

        fn set_running(&mut self, _running: bool) -> bool {
            true
        }

        fn process_buffer(&mut self) -> Result<bool, MixerError> {
            Err(MixerError::SinkWrite {
                name: "broken".to_string(),
                source: SinkError::Closed,
            })
        }
    }

    #[test]
    fn tick_error_ends_the_loop() {
        let stop = AtomicBool::new(false);
        let clock = ManualClock::new();
        let scheduler = Scheduler::new(50.0, 5.0).expect("scheduler");
        let result = scheduler.run(&mut Failing, &clock, &stop);
        assert!(matches!(result, Err(MixerError::SinkWrite { .. })));
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn spawned_scheduler_reports_fatal_errors_on_join() {
        let scheduler = Scheduler::new(50.0, 5.0).expect("scheduler");
        let handle = scheduler
            .spawn_with_clock(Failing, ManualClock::new())
            .expect("spawn");
        assert!(matches!(handle.join(), Err(MixerError::SinkWrite { .. })));
    }

    #[test]
    fn rejects_non_positive_rates() {
        assert!(Scheduler::new(0.0, 2.0).is_err());
        assert!(Scheduler::new(20.0, f64::NAN).is_err());
    }
}
