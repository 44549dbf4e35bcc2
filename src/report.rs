//! Result files.
//!
//! ```text
//! <report.dir>/
//!   sequential.csv     per-update rows
//!   concurrent.csv     per-update rows
//!   large-edits.csv    one row per edit size
//!   results.json       run summary
//!   metrics.prom       process counters
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::bench::{ScenarioKind, ScenarioOutcome, sweep};
use crate::{collector, metrics};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode results: {0}")]
    Json(#[from] serde_json::Error),
}

/// Contents of `results.json`.
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub name: &'a str,
    pub relay: &'a str,
    pub finished_at: String,
    pub passed: usize,
    pub failed: usize,
    pub scenarios: &'a [ScenarioOutcome],
}

impl<'a> RunSummary<'a> {
    pub fn new(name: &'a str, relay: &'a str, scenarios: &'a [ScenarioOutcome]) -> Self {
        let passed = scenarios.iter().filter(|o| o.passed()).count();
        Self {
            name,
            relay,
            finished_at: chrono::Utc::now().to_rfc3339(),
            passed,
            failed: scenarios.len() - passed,
            scenarios,
        }
    }
}

fn write_file(path: PathBuf, contents: &str) -> Result<PathBuf, ReportError> {
    fs::write(&path, contents).map_err(|source| ReportError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Write every report file into `dir` and return their paths.
pub fn write(dir: &Path, summary: &RunSummary<'_>) -> Result<Vec<PathBuf>, ReportError> {
    fs::create_dir_all(dir).map_err(|source| ReportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::new();
    for outcome in summary.scenarios {
        let csv = match outcome.scenario {
            ScenarioKind::LargeEdits => sweep::to_csv(&outcome.sweep),
            ScenarioKind::Sequential | ScenarioKind::Concurrent => collector::to_csv(&outcome.rows),
        };
        let path = dir.join(format!("{}.csv", outcome.scenario.key()));
        written.push(write_file(path, &csv)?);
    }

    let json = serde_json::to_string_pretty(summary)?;
    written.push(write_file(dir.join("results.json"), &json)?);
    written.push(write_file(dir.join("metrics.prom"), &metrics::gather_metrics())?);

    info!(dir = %dir.display(), files = written.len(), "report written");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::tests::{loopback_config, orchestrator};

    #[tokio::test]
    async fn test_report_files() {
        metrics::init();
        let mut config = loopback_config();
        config.bench.updates = 3;
        let outcomes = orchestrator(config)
            .run_all(&[ScenarioKind::Sequential, ScenarioKind::LargeEdits])
            .await;
        let summary = RunSummary::new("test", "loopback", &outcomes);
        assert_eq!(summary.passed, 2);

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested");
        let written = write(&out, &summary).unwrap();
        assert_eq!(written.len(), 4);

        let sequential = fs::read_to_string(out.join("sequential.csv")).unwrap();
        assert!(sequential.starts_with(collector::CSV_HEADER));
        assert_eq!(sequential.lines().count(), 4);

        let sweep = fs::read_to_string(out.join("large-edits.csv")).unwrap();
        assert!(sweep.starts_with("crdt,benchmark,editSize"));

        let results: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join("results.json")).unwrap()).unwrap();
        assert_eq!(results["scenarios"][0]["scenario"], "sequential");
        assert_eq!(results["scenarios"][0]["status"], "passed");
        assert_eq!(results["scenarios"][1]["scenario"], "large-edits");
        assert!(results["scenarios"][0].get("rows").is_none());

        let prom = fs::read_to_string(out.join("metrics.prom")).unwrap();
        assert!(prom.contains("relaybench_updates_sent_total"));
    }
}
