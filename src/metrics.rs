//! Prometheus counters for one benchmark process.
//!
//! The counters span every scenario of the run and are written to
//! `metrics.prom` next to the CSV reports.
//!
//! - `relaybench_updates_sent_total` - updates accepted by the relay
//! - `relaybench_send_failures_total{error}` - send attempts that failed
//! - `relaybench_rate_limited_total` - rate-limit refusals (send and poll)
//! - `relaybench_envelopes_received_total` - event records seen by the bridge
//! - `relaybench_envelopes_filtered_total{reason}` - records dropped by the session filter
//! - `relaybench_duplicates_dropped_total` - updates rejected by the dedup registry
//! - `relaybench_stage_duration_seconds{stage}` - latency per pipeline stage

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Send path
// ========================================================================

pub static UPDATES_SENT: OnceLock<IntCounter> = OnceLock::new();
pub static SEND_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();
pub static RATE_LIMITED: OnceLock<IntCounter> = OnceLock::new();

// ========================================================================
// Receive path
// ========================================================================

pub static ENVELOPES_RECEIVED: OnceLock<IntCounter> = OnceLock::new();
pub static ENVELOPES_FILTERED: OnceLock<IntCounterVec> = OnceLock::new();
pub static DUPLICATES_DROPPED: OnceLock<IntCounter> = OnceLock::new();

// ========================================================================
// Latency
// ========================================================================

/// Duration of pipeline stages (apply, encode, reload, poll round).
pub static STAGE_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Calling it more than once is harmless: later calls only log a
/// registration warning.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            if $metric.get().is_none() {
                match $init {
                    Ok(m) => {
                        if let Err(e) = r.register(Box::new(m.clone())) {
                            tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                        }
                        let _ = $metric.set(m);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                    }
                }
            }
        };
    }

    register!(UPDATES_SENT, IntCounter::new("relaybench_updates_sent_total", "Updates accepted by the relay"));
    register!(SEND_FAILURES, IntCounterVec::new(Opts::new("relaybench_send_failures_total", "Failed send attempts"), &["error"]));
    register!(RATE_LIMITED, IntCounter::new("relaybench_rate_limited_total", "Rate-limit refusals"));
    register!(ENVELOPES_RECEIVED, IntCounter::new("relaybench_envelopes_received_total", "Event records seen by the bridge"));
    register!(ENVELOPES_FILTERED, IntCounterVec::new(Opts::new("relaybench_envelopes_filtered_total", "Event records dropped by the session filter"), &["reason"]));
    register!(DUPLICATES_DROPPED, IntCounter::new("relaybench_duplicates_dropped_total", "Updates rejected as duplicates"));
    register!(STAGE_LATENCY, HistogramVec::new(
        HistogramOpts::new("relaybench_stage_duration_seconds", "Pipeline stage latency")
            .buckets(vec![0.00001, 0.0001, 0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 30.0]),
        &["stage"]));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
        String::new()
    })
}

// ============================================================================
// Helper functions
// ============================================================================

fn inc(metric: &OnceLock<IntCounter>) {
    if let Some(c) = metric.get() {
        c.inc();
    }
}

fn inc_label(metric: &OnceLock<IntCounterVec>, label: &str) {
    if let Some(c) = metric.get() {
        c.with_label_values(&[label]).inc();
    }
}

#[inline]
pub fn record_sent() {
    inc(&UPDATES_SENT);
}

#[inline]
pub fn record_send_failure(error: &str) {
    inc_label(&SEND_FAILURES, error);
}

#[inline]
pub fn record_rate_limited() {
    inc(&RATE_LIMITED);
}

#[inline]
pub fn record_envelope() {
    inc(&ENVELOPES_RECEIVED);
}

#[inline]
pub fn record_filtered(reason: &str) {
    inc_label(&ENVELOPES_FILTERED, reason);
}

#[inline]
pub fn record_duplicate() {
    inc(&DUPLICATES_DROPPED);
}

#[inline]
pub fn record_stage(stage: &str, duration_secs: f64) {
    if let Some(h) = STAGE_LATENCY.get() {
        h.with_label_values(&[stage]).observe(duration_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_lifecycle() {
        init();
        init();

        record_sent();
        record_filtered("stale");
        record_stage("apply", 0.001);

        let output = gather_metrics();
        assert!(output.contains("relaybench_updates_sent_total"));
        assert!(output.contains("reason=\"stale\""));
        assert!(output.contains("relaybench_stage_duration_seconds"));
    }
}
