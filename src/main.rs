//! relaybench - CRDT replication benchmark over a group-messaging relay.
//!
//! Drives replicas of a text CRDT, ships their updates through a relay
//! such as the signal-cli daemon, and measures latency, update sizes and
//! convergence.

mod bench;
mod collector;
mod config;
mod dedup;
mod error;
mod metrics;
mod poller;
mod replica;
mod report;
mod telemetry;
mod transport;

use std::path::Path;
use std::sync::Arc;

use relay_crdt::RgaFactory;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::bench::{Orchestrator, ScenarioKind};
use crate::config::Config;
use crate::report::RunSummary;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // relaybench [config.toml] [suite]
    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "relaybench.toml".to_string());
    let suite = args.next();

    let mut config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;
    if let Some(suite) = suite {
        config.run.suites = vec![suite];
    }

    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {}", errors.len(), config_path);
    }

    let kinds = ScenarioKind::selected(&config.run.suites);
    info!(
        name = %config.run.name,
        relay = ?config.relay.kind,
        group = %config.relay.group_id,
        scenarios = ?kinds.iter().map(|k| k.key()).collect::<Vec<_>>(),
        "Starting relaybench"
    );

    metrics::init();
    let relay = transport::connect(&config.relay)?;
    let relay_name = relay.name();
    let config = Arc::new(config);
    let orchestrator = Orchestrator::new(Arc::clone(&config), relay, Arc::new(RgaFactory));

    let outcomes = orchestrator.run_all(&kinds).await;

    let summary = RunSummary::new(&config.run.name, relay_name, &outcomes);
    report::write(Path::new(&config.report.dir), &summary)?;

    for outcome in &outcomes {
        info!(
            scenario = outcome.scenario.key(),
            status = ?outcome.status,
            sent = outcome.updates_sent,
            received = outcome.updates_received,
            mean_apply_ms = ?outcome.mean_apply_ms,
            "Scenario result"
        );
    }
    if summary.failed > 0 {
        anyhow::bail!("{} of {} scenario(s) failed", summary.failed, outcomes.len());
    }
    info!(passed = summary.passed, "All scenarios passed");
    Ok(())
}
