//! Process logger for the `mixdown` binary.
//!
//! Every accepted record is kept in a bounded backlog so `--show-log` can
//! print it after the run. Records are also echoed to stderr unless the
//! caller asked for the backlog only.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use log::{LevelFilter, Log, Metadata, Record};

const BACKLOG_LINES: usize = 500;

/// Bounded, shareable list of formatted log lines.
#[derive(Clone, Default)]
pub struct LogBacklog {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl LogBacklog {
    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, line: String) {
        let mut lines = self.lock();
        while lines.len() >= BACKLOG_LINES {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Copy of the current backlog, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }
}

struct MixdownLogger {
    level: LevelFilter,
    backlog: LogBacklog,
    echo_stderr: bool,
}

impl Log for MixdownLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = if record.target().starts_with("mixdown::") {
            let module = record.target().trim_start_matches("mixdown::");
            format!("[{}] {}: {}", record.level(), module, record.args())
        } else {
            format!("[{}] {}", record.level(), record.args())
        };
        if self.echo_stderr {
            eprintln!("{}", line);
        }
        self.backlog.push(line);
    }

    fn flush(&self) {}
}

static LOGGER: OnceLock<MixdownLogger> = OnceLock::new();

/// `RUST_LOG` as a single level name, defaulting to info.
fn level_from_env() -> LevelFilter {
    std::env::var("RUST_LOG")
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(LevelFilter::Info)
}

/// Install the process logger and return its backlog.
///
/// Calling this again returns the backlog of the logger installed first.
pub fn init(echo_stderr: bool) -> LogBacklog {
    let logger = LOGGER.get_or_init(|| MixdownLogger {
        level: level_from_env(),
        backlog: LogBacklog::default(),
        echo_stderr,
    });
    if log::set_logger(logger).is_ok() {
        log::set_max_level(logger.level);
    }
    logger.backlog.clone()
}
