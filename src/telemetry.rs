//! Telemetry utilities for stage timing and span naming.

use std::time::{Duration, Instant};

/// Guard for timing one pipeline stage and recording it.
///
/// Records the stage latency when finished or dropped, whichever comes
/// first.
pub struct StageTimer {
    stage: &'static str,
    start: Instant,
    recorded: bool,
}

impl StageTimer {
    /// Start timing a stage.
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            start: Instant::now(),
            recorded: false,
        }
    }

    /// Stop the timer and return the elapsed time.
    pub fn finish(mut self) -> Duration {
        let elapsed = self.start.elapsed();
        crate::metrics::record_stage(self.stage, elapsed.as_secs_f64());
        self.recorded = true;
        elapsed
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        if !self.recorded {
            crate::metrics::record_stage(self.stage, self.start.elapsed().as_secs_f64());
        }
    }
}

/// Milliseconds as a float, the unit of every timing column.
pub fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.0
}

/// Wall clock in milliseconds since the epoch, the unit of relay timestamps.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// Span covering one scenario.
    pub fn scenario(name: &str, run_id: &str) -> Span {
        info_span!("scenario", name = %name, run_id = %run_id)
    }

    /// Span covering one relay call.
    pub fn relay_call(relay: &str, op: &str, account: &str) -> Span {
        info_span!("relay", relay = %relay, op = %op, account = %account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_returns_elapsed() {
        let timer = StageTimer::new("test");
        std::thread::sleep(Duration::from_millis(2));
        assert!(timer.finish() >= Duration::from_millis(2));
    }

    #[test]
    fn test_millis() {
        assert_eq!(millis(Duration::from_micros(1_500)), 1.5);
    }
}
