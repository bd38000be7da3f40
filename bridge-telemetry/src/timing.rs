//! Wall-clock timing for dispatched calls.

use std::time::{Duration, Instant};

use tracing::debug;

/// Measures one call from construction to [`CallTimer::finish`].
#[derive(Debug, Clone, Copy)]
pub struct CallTimer {
    label: &'static str,
    started: Instant,
}

impl CallTimer {
    /// Starts timing.
    #[must_use]
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            started: Instant::now(),
        }
    }

    /// Time since [`CallTimer::start`].
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Elapsed time in milliseconds with microsecond precision, e.g. `"0.412"`.
    #[must_use]
    pub fn millis_header(&self) -> String {
        format_millis(self.elapsed())
    }

    /// Logs the elapsed time at `debug` and returns it.
    pub fn finish(self) -> Duration {
        let elapsed = self.elapsed();
        debug!(call = self.label, ?elapsed, "call finished");
        elapsed
    }
}

/// Formats a duration as fractional milliseconds.
#[must_use]
pub fn format_millis(elapsed: Duration) -> String {
    format!("{:.3}", elapsed.as_secs_f64() * 1000.0)
}
