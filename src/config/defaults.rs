//! Default value functions for configuration.

// =============================================================================
// Run Defaults
// =============================================================================

pub fn default_run_name() -> String {
    "relaybench".to_string()
}

// =============================================================================
// Relay Defaults
// =============================================================================

pub fn default_relay_url() -> String {
    "http://localhost:8080".to_string()
}

pub fn default_cli_path() -> String {
    "signal-cli".to_string()
}

pub fn default_max_messages() -> u32 {
    100
}

pub fn default_receive_timeout_secs() -> u64 {
    1
}

pub fn default_true() -> bool {
    true
}

// =============================================================================
// Bench Defaults
// =============================================================================

pub fn default_updates() -> usize {
    100
}

pub fn default_send_concurrency() -> usize {
    8
}

pub fn default_max_send_attempts() -> u32 {
    3
}

pub fn default_send_retry_ms() -> u64 {
    1_000
}

pub fn default_seed_text_len() -> usize {
    100
}

pub fn default_listener_shutdown_timeout_ms() -> u64 {
    1_000
}

pub fn default_sweep_sizes() -> Vec<usize> {
    vec![1, 5, 10, 50, 100, 500, 1_000, 5_000, 10_000, 50_000]
}

// =============================================================================
// Idle Poll Defaults
// =============================================================================

pub fn default_max_idle_rounds() -> u32 {
    5
}

pub fn default_idle_delay_ms() -> u64 {
    250
}

pub fn default_error_delay_ms() -> u64 {
    1_000
}

// =============================================================================
// Concurrent Scenario Defaults
// =============================================================================

pub fn default_delay_a() -> super::DelayRange {
    super::DelayRange { lo: 200, hi: 300 }
}

pub fn default_delay_b() -> super::DelayRange {
    super::DelayRange { lo: 100, hi: 400 }
}

// =============================================================================
// Report Defaults
// =============================================================================

pub fn default_report_dir() -> String {
    "benchmark-data".to_string()
}
