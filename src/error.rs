//! Error taxonomy for the benchmark.
//!
//! Relay failures are recoverable in the receive and send loops:
//! [`RelayError::Transport`] is retried after a fixed delay and
//! [`RelayError::RateLimited`] after the relay's wait hint. A
//! [`ScenarioError`] ends one scenario; the orchestrator records it and
//! moves on to the next.

use bytes::Bytes;
use relay_crdt::DocError;
use relay_proto::RateLimit;
use thiserror::Error;

// ============================================================================
// Relay Errors
// ============================================================================

/// Failure of one relay call.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited: {0}")]
    RateLimited(RateLimit),

    #[error("{0} is not supported by this relay")]
    Unsupported(&'static str),
}

impl RelayError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::RateLimited(_) => "rate_limited",
            Self::Unsupported(_) => "unsupported",
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<std::io::Error> for RelayError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

// ============================================================================
// Scenario Errors
// ============================================================================

/// Reason a scenario failed.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("replicas diverged: {left_len} vs {right_len} chars, first difference at {at}")]
    ConvergenceMismatch {
        left_len: usize,
        right_len: usize,
        at: usize,
    },

    #[error("reloaded state differs from its source replica")]
    ReloadMismatch,

    #[error("replica text differs from the inserted string")]
    ContentMismatch,

    #[error("local edit produced no update")]
    NoUpdate,

    #[error("one transaction emitted {0} updates")]
    SplitUpdate(usize),

    /// The edit failed part way. `update` carries the changes that were
    /// already applied to the local replica.
    #[error("local edit failed after partial changes: {source}")]
    PartialEdit {
        update: Bytes,
        #[source]
        source: DocError,
    },

    #[error("engine error: {0}")]
    Doc(#[from] DocError),

    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("task failed: {0}")]
    Task(String),
}

impl ScenarioError {
    /// Compare two replica texts.
    pub fn check_converged(left: &str, right: &str) -> Result<(), Self> {
        if left == right {
            return Ok(());
        }
        let at = left
            .chars()
            .zip(right.chars())
            .take_while(|(a, b)| a == b)
            .count();
        Err(Self::ConvergenceMismatch {
            left_len: left.chars().count(),
            right_len: right.chars().count(),
            at,
        })
    }

    /// Get a static error code string for reports.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConvergenceMismatch { .. } => "convergence_mismatch",
            Self::ReloadMismatch => "reload_mismatch",
            Self::ContentMismatch => "content_mismatch",
            Self::NoUpdate => "no_update",
            Self::SplitUpdate(_) => "split_update",
            Self::PartialEdit { .. } => "partial_edit",
            Self::Doc(_) => "engine",
            Self::Relay(e) => e.error_code(),
            Self::Task(_) => "task",
        }
    }
}

impl From<tokio::task::JoinError> for ScenarioError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}
