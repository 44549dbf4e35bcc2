//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Benchmark configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Run identity and suite selection.
    #[serde(default)]
    pub run: RunConfig,
    /// Relay connection.
    #[serde(default)]
    pub relay: RelayConfig,
    /// Workload and polling parameters.
    #[serde(default)]
    pub bench: BenchConfig,
    /// Output location.
    #[serde(default)]
    pub report: ReportConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Run identity.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Label written into `results.json`.
    #[serde(default = "default_run_name")]
    pub name: String,
    /// Scenarios to run, matched by prefix. Empty runs everything.
    #[serde(default)]
    pub suites: Vec<String>,
    /// Seed for edit generation. Random when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: default_run_name(),
            suites: Vec::new(),
            seed: None,
        }
    }
}

/// Which relay implementation to drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayKind {
    /// signal-cli JSON-RPC daemon over HTTP (poll and push).
    #[default]
    Http,
    /// signal-cli command line tool (poll only).
    Cli,
    /// In-process relay for dry runs.
    Loopback,
}

/// Relay connection and accounts.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub kind: RelayKind,
    /// Base URL of the HTTP daemon.
    #[serde(default = "default_relay_url")]
    pub url: String,
    /// signal-cli executable.
    #[serde(default = "default_cli_path")]
    pub cli_path: String,
    /// Passed to signal-cli as `--config`.
    #[serde(default)]
    pub cli_config_dir: Option<String>,
    /// Group both replicas post to.
    #[serde(default)]
    pub group_id: String,
    /// Account of replica A.
    #[serde(default)]
    pub sender_account: String,
    /// Account of replica B.
    #[serde(default)]
    pub receiver_account: String,
    /// Upper bound per poll.
    #[serde(default = "default_max_messages")]
    pub max_messages: u32,
    /// Server-side wait per poll.
    #[serde(default = "default_receive_timeout_secs")]
    pub receive_timeout_secs: u64,
    /// Client-side pacing of sends. Unset sends as fast as the pool allows.
    #[serde(default)]
    pub send_rate_per_second: Option<u32>,
    /// Reject payloads that carry no run id.
    #[serde(default = "default_true")]
    pub strict_run_filter: bool,
    /// Fault injection for the loopback relay.
    #[serde(default)]
    pub loopback: LoopbackConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            kind: RelayKind::default(),
            url: default_relay_url(),
            cli_path: default_cli_path(),
            cli_config_dir: None,
            group_id: String::new(),
            sender_account: String::new(),
            receiver_account: String::new(),
            max_messages: default_max_messages(),
            receive_timeout_secs: default_receive_timeout_secs(),
            send_rate_per_second: None,
            strict_run_filter: true,
            loopback: LoopbackConfig::default(),
        }
    }
}

/// Loopback fault injection. Zero disables a fault.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoopbackConfig {
    /// Deliver every n-th message twice.
    #[serde(default)]
    pub duplicate_every: u32,
    /// Shuffle each poll batch.
    #[serde(default)]
    pub reorder: bool,
    /// Delay before a sent message becomes visible.
    #[serde(default)]
    pub latency_ms: u64,
    /// Refuse every n-th send with a rate-limit error.
    #[serde(default)]
    pub rate_limit_every: u32,
}

/// Inclusive millisecond range, written `[lo, hi]` in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "[u64; 2]")]
pub struct DelayRange {
    pub lo: u64,
    pub hi: u64,
}

impl From<[u64; 2]> for DelayRange {
    fn from([lo, hi]: [u64; 2]) -> Self {
        Self { lo, hi }
    }
}

/// Workload parameters shared by the scenarios.
#[derive(Debug, Clone, Deserialize)]
pub struct BenchConfig {
    /// Updates per producer.
    #[serde(default = "default_updates")]
    pub updates: usize,
    /// Concurrent senders during bulk sends.
    #[serde(default = "default_send_concurrency")]
    pub send_concurrency: usize,
    #[serde(default = "default_max_send_attempts")]
    pub max_send_attempts: u32,
    #[serde(default = "default_send_retry_ms")]
    pub send_retry_ms: u64,
    /// Length of the random text both replicas start from.
    #[serde(default = "default_seed_text_len")]
    pub seed_text_len: usize,
    #[serde(default = "default_listener_shutdown_timeout_ms")]
    pub listener_shutdown_timeout_ms: u64,
    /// Edit sizes of the large-edit sweep, ascending.
    #[serde(default = "default_sweep_sizes")]
    pub sweep_sizes: Vec<usize>,
    #[serde(default)]
    pub idle: IdleConfig,
    #[serde(default)]
    pub concurrent: ConcurrentConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            updates: default_updates(),
            send_concurrency: default_send_concurrency(),
            max_send_attempts: default_max_send_attempts(),
            send_retry_ms: default_send_retry_ms(),
            seed_text_len: default_seed_text_len(),
            listener_shutdown_timeout_ms: default_listener_shutdown_timeout_ms(),
            sweep_sizes: default_sweep_sizes(),
            idle: IdleConfig::default(),
            concurrent: ConcurrentConfig::default(),
        }
    }
}

impl BenchConfig {
    pub fn send_retry(&self) -> Duration {
        Duration::from_millis(self.send_retry_ms)
    }

    pub fn listener_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.listener_shutdown_timeout_ms)
    }
}

/// Give-up policy for receive loops.
///
/// A receive loop stops after `max_idle_rounds` consecutive rounds that
/// produced nothing new, sleeping `idle_delay_ms` between them and
/// `error_delay_ms` after a transport failure.
#[derive(Debug, Clone, Deserialize)]
pub struct IdleConfig {
    #[serde(default = "default_max_idle_rounds")]
    pub max_idle_rounds: u32,
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,
    #[serde(default = "default_error_delay_ms")]
    pub error_delay_ms: u64,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            max_idle_rounds: default_max_idle_rounds(),
            idle_delay_ms: default_idle_delay_ms(),
            error_delay_ms: default_error_delay_ms(),
        }
    }
}

/// Inter-edit delays of the dual-producer scenario.
#[derive(Debug, Clone, Deserialize)]
pub struct ConcurrentConfig {
    #[serde(default = "default_delay_a", rename = "delay_a_ms")]
    pub delay_a: DelayRange,
    #[serde(default = "default_delay_b", rename = "delay_b_ms")]
    pub delay_b: DelayRange,
}

impl Default for ConcurrentConfig {
    fn default() -> Self {
        Self {
            delay_a: default_delay_a(),
            delay_b: default_delay_b(),
        }
    }
}

/// Output location.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_report_dir")]
    pub dir: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            dir: default_report_dir(),
        }
    }
}
