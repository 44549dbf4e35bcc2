//! Benchmark scenarios and the orchestrator that runs them.
//!
//! Each scenario gets a fresh [`ScenarioContext`]: a new run id, its own
//! dedup registry and metrics collector. A scenario that fails is
//! recorded in its [`ScenarioOutcome`] and the next one still runs.

pub mod concurrent;
pub mod edits;
pub mod sender;
pub mod sequential;
pub mod sweep;

use std::sync::Arc;
use std::time::{Duration, Instant};

use relay_crdt::DocumentFactory;
use serde::Serialize;
use tracing::{Instrument, error, info};

use crate::collector::{MetricsCollector, MetricsRow};
use crate::config::Config;
use crate::dedup::{Admission, DedupRegistry};
use crate::error::ScenarioError;
use crate::metrics;
use crate::poller::{IdlePolicy, PollReport};
use crate::replica::ReplicaDriver;
use crate::telemetry::{StageTimer, millis, spans};
use crate::transport::listener::ListenerExit;
use crate::transport::{DecodedUpdate, Relay, Session, TransportBridge};

pub use edits::WordGen;
pub use sweep::SweepRow;

// ============================================================================
// Scenario selection
// ============================================================================

/// The scenarios this benchmark knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    /// One producer, bulk send, polling receiver.
    Sequential,
    /// Two producers, push listener, cross-apply.
    Concurrent,
    /// In-process sweep over edit sizes.
    LargeEdits,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 3] = [Self::Sequential, Self::Concurrent, Self::LargeEdits];

    pub fn key(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Concurrent => "concurrent",
            Self::LargeEdits => "large-edits",
        }
    }

    pub fn keys() -> Vec<&'static str> {
        Self::ALL.iter().map(|k| k.key()).collect()
    }

    /// Scenarios whose key starts with one of `suites`, in run order.
    /// No suites selects everything.
    pub fn selected(suites: &[String]) -> Vec<Self> {
        if suites.is_empty() {
            return Self::ALL.to_vec();
        }
        Self::ALL
            .into_iter()
            .filter(|kind| suites.iter().any(|s| kind.key().starts_with(s.as_str())))
            .collect()
    }
}

// ============================================================================
// Per-scenario state
// ============================================================================

/// What one scenario run owns.
pub struct ScenarioContext {
    pub config: Arc<Config>,
    pub factory: Arc<dyn DocumentFactory>,
    pub bridge: Arc<TransportBridge>,
    pub collector: Arc<MetricsCollector>,
    pub registry: DedupRegistry,
    salt: u64,
}

impl ScenarioContext {
    pub fn new(
        config: Arc<Config>,
        relay: Arc<dyn Relay>,
        factory: Arc<dyn DocumentFactory>,
        kind: ScenarioKind,
    ) -> Self {
        let session = Session::start(&config.relay.group_id, config.relay.strict_run_filter);
        let bridge = Arc::new(TransportBridge::new(relay, session, &config.relay));
        Self {
            config,
            factory,
            bridge,
            collector: Arc::new(MetricsCollector::new()),
            registry: DedupRegistry::new(),
            salt: kind as u64,
        }
    }

    pub fn session(&self) -> &Session {
        self.bridge.session()
    }

    /// Edit generator for this scenario, derived from the run seed.
    pub fn words(&self) -> WordGen {
        WordGen::new(self.config.run.seed.map(|s| s.wrapping_add(self.salt)))
    }

    pub fn poll_policy(&self) -> IdlePolicy {
        IdlePolicy::from(&self.config.bench.idle)
    }

    /// Offer a decoded update to the registry and record its receipt.
    /// Returns false for duplicates, which are dropped silently.
    pub fn admit(&self, update: &DecodedUpdate) -> bool {
        match self.registry.admit(update.id, update.update.clone()) {
            Admission::Accepted => {
                self.collector
                    .record_received(update.id, update.received_at, update.envelope_ts);
                true
            }
            Admission::Duplicate => {
                metrics::record_duplicate();
                false
            }
        }
    }

    /// Apply an admitted update and record its apply time.
    pub fn apply(&self, id: u64, update: &[u8], replica: &mut ReplicaDriver) -> Result<(), ScenarioError> {
        let elapsed = replica.apply_remote(update)?;
        self.collector.record_applied(id, millis(elapsed));
        Ok(())
    }

    /// Admit, then apply right away. Returns whether the update was new.
    pub fn deliver(&self, update: DecodedUpdate, replica: &mut ReplicaDriver) -> Result<bool, ScenarioError> {
        if !self.admit(&update) {
            return Ok(false);
        }
        self.apply(update.id, &update.update, replica)?;
        Ok(true)
    }
}

/// What a scenario found, beyond the per-update rows.
#[derive(Debug, Default)]
pub struct Findings {
    pub poll: Option<PollReport>,
    pub encode: Option<Duration>,
    pub reload: Option<Duration>,
    pub text_len: Option<usize>,
    pub listener: Option<ListenerExit>,
    pub sweep: Vec<SweepRow>,
    /// Verification failure. The scenario still produced its metrics.
    pub failure: Option<ScenarioError>,
}

impl Findings {
    fn fail(&mut self, err: ScenarioError) {
        if self.failure.is_none() {
            self.failure = Some(err);
        }
    }

    /// Encode `replica`, load the encoding into a fresh replica and check
    /// that it reads the same.
    pub fn measure_reload(
        &mut self,
        factory: &dyn DocumentFactory,
        replica: &ReplicaDriver,
    ) -> Result<(), ScenarioError> {
        let timer = StageTimer::new("encode");
        let snapshot = replica.snapshot()?;
        self.encode = Some(timer.finish());

        let timer = StageTimer::new("reload");
        let reloaded = ReplicaDriver::load(factory, &snapshot)?;
        self.reload = Some(timer.finish());

        self.text_len = Some(snapshot.text_len);
        if reloaded.text() != replica.text() {
            self.fail(ScenarioError::ReloadMismatch);
        }
        Ok(())
    }

    /// Record a divergence between two replica texts.
    pub fn check_converged(&mut self, left: &str, right: &str) {
        if let Err(e) = ScenarioError::check_converged(left, right) {
            self.fail(e);
        }
    }
}

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Passed,
    Failed,
}

/// Result of one scenario, as written to `results.json`.
#[derive(Debug, Serialize)]
pub struct ScenarioOutcome {
    pub scenario: ScenarioKind,
    pub engine: &'static str,
    pub run_id: String,
    pub status: Status,
    pub error_code: Option<&'static str>,
    pub error: Option<String>,
    pub elapsed_ms: f64,
    pub updates_sent: usize,
    pub updates_received: usize,
    pub updates_applied: usize,
    pub total_bytes_sent: usize,
    pub mean_apply_ms: Option<f64>,
    pub encode_ms: Option<f64>,
    pub reload_ms: Option<f64>,
    pub text_len: Option<usize>,
    pub poll: Option<PollReport>,
    pub listener: Option<ListenerExit>,
    #[serde(skip)]
    pub rows: Vec<MetricsRow>,
    #[serde(skip)]
    pub sweep: Vec<SweepRow>,
}

impl ScenarioOutcome {
    pub fn passed(&self) -> bool {
        self.status == Status::Passed
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs the selected scenarios one after another.
pub struct Orchestrator {
    config: Arc<Config>,
    relay: Arc<dyn Relay>,
    factory: Arc<dyn DocumentFactory>,
}

impl Orchestrator {
    pub fn new(config: Arc<Config>, relay: Arc<dyn Relay>, factory: Arc<dyn DocumentFactory>) -> Self {
        Self {
            config,
            relay,
            factory,
        }
    }

    pub async fn run_all(&self, kinds: &[ScenarioKind]) -> Vec<ScenarioOutcome> {
        let mut outcomes = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            outcomes.push(self.run(kind).await);
        }
        outcomes
    }

    /// Run one scenario. Never fails: errors end up in the outcome.
    pub async fn run(&self, kind: ScenarioKind) -> ScenarioOutcome {
        let ctx = ScenarioContext::new(
            Arc::clone(&self.config),
            Arc::clone(&self.relay),
            Arc::clone(&self.factory),
            kind,
        );
        let run_id = ctx.session().run_id.as_str().to_string();
        let span = spans::scenario(kind.key(), &run_id);
        let started = Instant::now();

        let result = async {
            info!(engine = self.factory.name(), relay = self.relay.name(), "scenario starting");
            match kind {
                ScenarioKind::Sequential => sequential::run(&ctx).await,
                ScenarioKind::Concurrent => concurrent::run(&ctx).await,
                ScenarioKind::LargeEdits => sweep::run(&ctx),
            }
        }
        .instrument(span.clone())
        .await;

        let (mut findings, failure) = match result {
            Ok(mut findings) => {
                let failure = findings.failure.take();
                (findings, failure)
            }
            Err(e) => (Findings::default(), Some(e)),
        };
        let elapsed_ms = millis(started.elapsed());
        let collector = &ctx.collector;
        let rows = collector.export();

        span.in_scope(|| match &failure {
            None => info!(elapsed_ms, rows = collector.len(), "scenario passed"),
            Some(e) => error!(error = %e, code = e.error_code(), elapsed_ms, "scenario failed"),
        });

        ScenarioOutcome {
            scenario: kind,
            engine: self.factory.name(),
            run_id,
            status: if failure.is_none() {
                Status::Passed
            } else {
                Status::Failed
            },
            error_code: failure.as_ref().map(ScenarioError::error_code),
            error: failure.as_ref().map(ToString::to_string),
            elapsed_ms,
            updates_sent: rows.iter().filter(|r| r.sending_timestamp.is_some()).count(),
            updates_received: collector.received_count(),
            updates_applied: collector.applied_count(),
            total_bytes_sent: collector.total_bytes_sent(),
            mean_apply_ms: collector.mean_apply_ms(),
            encode_ms: findings.encode.map(millis),
            reload_ms: findings.reload.map(millis),
            text_len: findings.text_len,
            poll: findings.poll,
            listener: findings.listener,
            rows,
            sweep: std::mem::take(&mut findings.sweep),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{DelayRange, RelayKind};
    use crate::transport;
    use relay_crdt::RgaFactory;
    use relay_proto::{DataMessage, EventRecord, GroupInfo, MessageBody, RawEnvelope, RawMessage};

    /// Small, fast loopback configuration.
    pub(crate) fn loopback_config() -> Config {
        let mut config = Config::default();
        config.run.seed = Some(7);
        config.relay.kind = RelayKind::Loopback;
        config.relay.group_id = "grp".into();
        config.relay.sender_account = "+100".into();
        config.relay.receiver_account = "+200".into();
        config.relay.receive_timeout_secs = 0;
        config.bench.updates = 10;
        config.bench.send_concurrency = 3;
        config.bench.send_retry_ms = 1;
        config.bench.seed_text_len = 20;
        config.bench.listener_shutdown_timeout_ms = 500;
        config.bench.sweep_sizes = vec![1, 10, 100];
        config.bench.idle.max_idle_rounds = 3;
        config.bench.idle.idle_delay_ms = 20;
        config.bench.idle.error_delay_ms = 5;
        config.bench.concurrent.delay_a = DelayRange { lo: 0, hi: 2 };
        config.bench.concurrent.delay_b = DelayRange { lo: 0, hi: 3 };
        config
    }

    pub(crate) fn orchestrator(config: Config) -> Orchestrator {
        let relay = transport::connect(&config.relay).unwrap();
        Orchestrator::new(Arc::new(config), relay, Arc::new(RgaFactory))
    }

    #[test]
    fn test_suite_selection() {
        assert_eq!(ScenarioKind::selected(&[]), ScenarioKind::ALL.to_vec());
        assert_eq!(
            ScenarioKind::selected(&["large".into(), "seq".into()]),
            vec![ScenarioKind::Sequential, ScenarioKind::LargeEdits]
        );
        assert!(ScenarioKind::selected(&["s4".into()]).is_empty());
        assert_eq!(ScenarioKind::keys(), vec!["sequential", "concurrent", "large-edits"]);
    }

    #[test]
    fn test_same_envelope_twice_is_received_and_applied_once() {
        let config = loopback_config();
        let relay = transport::connect(&config.relay).unwrap();
        let ctx = ScenarioContext::new(
            Arc::new(config),
            relay,
            Arc::new(RgaFactory),
            ScenarioKind::Sequential,
        );

        let mut source = ReplicaDriver::create(ctx.factory.as_ref());
        let edit = source.insert(0, "hi").unwrap();
        let text = MessageBody::wrap(&ctx.session().run_id, 1, &edit.update).to_text();
        let record = EventRecord {
            account: Some("+200".into()),
            envelope: Some(RawEnvelope {
                source: Some("+100".into()),
                source_number: None,
                timestamp: Some(ctx.session().started_at_ms + 1),
                server_received_timestamp: None,
                server_delivered_timestamp: None,
                data_message: Some(DataMessage {
                    timestamp: None,
                    message: Some(RawMessage::Text(text)),
                    group_info: Some(GroupInfo {
                        group_id: "grp".into(),
                        kind: Some("DELIVER".into()),
                    }),
                }),
            }),
        };

        let mut replica = ReplicaDriver::create(ctx.factory.as_ref());
        for _ in 0..2 {
            let update = ctx.session().filter(record.clone(), 42).unwrap();
            ctx.deliver(update, &mut replica).unwrap();
        }
        assert_eq!(ctx.collector.received_count(), 1);
        assert_eq!(ctx.collector.applied_count(), 1);
        assert_eq!(ctx.registry.len(), 1);
        assert_eq!(replica.text(), "hi");
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let mut config = loopback_config();
        config.bench.sweep_sizes = vec![1, 5];
        // Nobody else is in the group, so nothing comes back.
        config.relay.receiver_account = config.relay.sender_account.clone();
        config.bench.updates = 3;

        let outcomes = orchestrator(config)
            .run_all(&[ScenarioKind::Sequential, ScenarioKind::LargeEdits])
            .await;
        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].passed());
        assert_eq!(outcomes[0].error_code, Some("convergence_mismatch"));
        assert_eq!(outcomes[0].updates_sent, 3);
        assert_eq!(outcomes[0].updates_received, 0);
        assert!(outcomes[1].passed());
        assert_eq!(outcomes[1].sweep.len(), 2);
        assert_ne!(outcomes[0].run_id, outcomes[1].run_id);
    }
}
