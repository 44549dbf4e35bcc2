//! Give-up policy for receive loops.
//!
//! An at-least-once relay never says "that was everything". The
//! [`IdlePoller`] keeps asking for more until either the expected number
//! of updates has been collected or a configured number of consecutive
//! rounds produced nothing new.
//!
//! ```text
//!            ┌──────── k ≥ 1, collected < target ────────┐
//!            ▼                                            │
//!   ──► Polling ── round ──┬── collected ≥ target ──► Satisfied
//!            ▲             │
//!            │             ├── 0 new, idle < max ──► BackingOff ── sleep ──┐
//!            │             │                                              │
//!            │             └── 0 new, idle ≥ max ──► GaveUp               │
//!            └────────────────────────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::IdleConfig;
use crate::error::RelayError;

/// Where the poller is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Polling,
    BackingOff,
    GaveUp,
    Satisfied,
}

/// What one round produced.
#[derive(Debug)]
pub enum RoundOutcome {
    /// This many updates were accepted (duplicates not counted).
    Yielded(usize),
    /// Nothing new arrived.
    Empty,
    /// The relay call failed.
    Failed(RelayError),
}

/// Sleep durations and give-up threshold.
#[derive(Debug, Clone, Copy)]
pub struct IdlePolicy {
    pub max_idle_rounds: u32,
    pub idle_delay: Duration,
    pub error_delay: Duration,
}

impl From<&IdleConfig> for IdlePolicy {
    fn from(cfg: &IdleConfig) -> Self {
        Self {
            max_idle_rounds: cfg.max_idle_rounds,
            idle_delay: Duration::from_millis(cfg.idle_delay_ms),
            error_delay: Duration::from_millis(cfg.error_delay_ms),
        }
    }
}

/// Summary of a finished poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PollReport {
    pub state: PollState,
    pub target: usize,
    pub collected: usize,
    pub rounds: u32,
    pub idle_rounds: u32,
    pub transport_errors: u32,
    pub rate_limited: u32,
}

/// Idle-round state machine.
#[derive(Debug)]
pub struct IdlePoller {
    policy: IdlePolicy,
    state: PollState,
    target: usize,
    collected: usize,
    idle: u32,
    rounds: u32,
    idle_rounds: u32,
    transport_errors: u32,
    rate_limited: u32,
}

impl IdlePoller {
    pub fn new(target: usize, policy: IdlePolicy) -> Self {
        let state = if target == 0 {
            PollState::Satisfied
        } else {
            PollState::Polling
        };
        Self {
            policy,
            state,
            target,
            collected: 0,
            idle: 0,
            rounds: 0,
            idle_rounds: 0,
            transport_errors: 0,
            rate_limited: 0,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, PollState::Satisfied | PollState::GaveUp)
    }

    /// Feed the outcome of one round. Returns how long to sleep before the
    /// next round, or `None` when the next round may start right away or
    /// the poller is done.
    pub fn record(&mut self, outcome: RoundOutcome) -> Option<Duration> {
        if self.is_done() {
            return None;
        }
        self.rounds += 1;
        let delay = match outcome {
            RoundOutcome::Yielded(k) if k > 0 => {
                self.collected += k;
                self.idle = 0;
                self.state = if self.collected >= self.target {
                    PollState::Satisfied
                } else {
                    PollState::Polling
                };
                return None;
            }
            RoundOutcome::Yielded(_) | RoundOutcome::Empty => self.policy.idle_delay,
            RoundOutcome::Failed(RelayError::RateLimited(limit)) => {
                self.rate_limited += 1;
                warn!(
                    challenge = limit.challenge.as_deref().unwrap_or("n/a"),
                    options = %limit.options.join(","),
                    wait = ?limit.wait_seconds,
                    "relay rate limit while polling"
                );
                limit
                    .wait_seconds
                    .map_or(self.policy.error_delay, Duration::from_secs)
            }
            RoundOutcome::Failed(e) => {
                self.transport_errors += 1;
                warn!(error = %e, "poll round failed");
                self.policy.error_delay
            }
        };
        self.idle += 1;
        self.idle_rounds += 1;
        if self.idle >= self.policy.max_idle_rounds {
            info!(
                collected = self.collected,
                target = self.target,
                idle_rounds = self.idle,
                "giving up after idle rounds"
            );
            self.state = PollState::GaveUp;
            None
        } else {
            debug!(idle = self.idle, ?delay, "backing off");
            self.state = PollState::BackingOff;
            Some(delay)
        }
    }

    /// [`record`](Self::record) one round, then sleep out the backoff.
    pub async fn step(&mut self, outcome: RoundOutcome) {
        if let Some(delay) = self.record(outcome) {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.state = PollState::Polling;
        }
    }

    /// Stop early: the source is gone and no round can yield again.
    pub fn give_up(&mut self) {
        if !self.is_done() {
            self.state = PollState::GaveUp;
        }
    }

    /// Drive `round` until satisfied or given up.
    pub async fn run<F, Fut>(mut self, mut round: F) -> PollReport
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RoundOutcome>,
    {
        while !self.is_done() {
            let outcome = round().await;
            self.step(outcome).await;
        }
        self.report()
    }

    pub fn report(&self) -> PollReport {
        PollReport {
            state: self.state,
            target: self.target,
            collected: self.collected,
            rounds: self.rounds,
            idle_rounds: self.idle_rounds,
            transport_errors: self.transport_errors,
            rate_limited: self.rate_limited,
        }
    }
}
