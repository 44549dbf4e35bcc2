//! Large-edit sweep: one insertion per size, replicated in process.

use std::fmt::Write as _;

use relay_crdt::DocumentFactory;
use serde::Serialize;
use tracing::info;

use super::edits::WordGen;
use super::{Findings, ScenarioContext};
use crate::error::ScenarioError;
use crate::replica::ReplicaDriver;
use crate::telemetry::{StageTimer, millis};

pub const SWEEP_CSV_HEADER: &str = "crdt,benchmark,editSize,localOpTimeMs,remoteApplyTimeMs,\
encodeTimeMs,parseTimeMs,updateCount,totalUpdateBytes,avgUpdateBytes,docSize";

/// Measurements for one edit size.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepRow {
    pub crdt: &'static str,
    pub benchmark: String,
    pub edit_size: usize,
    pub local_op_time_ms: f64,
    pub remote_apply_time_ms: f64,
    pub encode_time_ms: f64,
    pub parse_time_ms: f64,
    pub update_count: usize,
    pub total_update_bytes: usize,
    pub avg_update_bytes: usize,
    pub doc_size: usize,
}

impl SweepRow {
    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{},{}",
            self.crdt,
            // Labels contain spaces and brackets; quote them as JSON strings.
            serde_json::Value::from(self.benchmark.as_str()),
            self.edit_size,
            self.local_op_time_ms,
            self.remote_apply_time_ms,
            self.encode_time_ms,
            self.parse_time_ms,
            self.update_count,
            self.total_update_bytes,
            self.avg_update_bytes,
            self.doc_size,
        )
    }
}

pub fn to_csv(rows: &[SweepRow]) -> String {
    let mut out = String::from(SWEEP_CSV_HEADER);
    out.push('\n');
    for row in rows {
        let _ = writeln!(out, "{}", row.to_csv_line());
    }
    out
}

/// Insert one word of `size` characters into a fresh replica and replay
/// its update on a second one.
pub fn measure(
    factory: &dyn DocumentFactory,
    size: usize,
    words: &mut WordGen,
) -> Result<(SweepRow, Option<ScenarioError>), ScenarioError> {
    let word = words.word(size);
    let mut source = ReplicaDriver::create(factory);
    let mut replica = ReplicaDriver::create(factory);

    let edit = source.insert(0, &word)?;
    let remote = replica.apply_remote(&edit.update)?;

    let timer = StageTimer::new("encode");
    let snapshot = source.snapshot()?;
    let encode = timer.finish();

    let timer = StageTimer::new("reload");
    let reloaded = ReplicaDriver::load(factory, &snapshot)?;
    let parse = timer.finish();

    let failure = if source.text() != word || replica.text() != word {
        Some(ScenarioError::ContentMismatch)
    } else if reloaded.text() != replica.text() {
        Some(ScenarioError::ReloadMismatch)
    } else {
        None
    };

    let total = edit.update.len();
    let row = SweepRow {
        crdt: factory.name(),
        benchmark: format!("[B4] Insert string of length {size}"),
        edit_size: size,
        local_op_time_ms: millis(edit.elapsed),
        remote_apply_time_ms: millis(remote),
        encode_time_ms: millis(encode),
        parse_time_ms: millis(parse),
        update_count: 1,
        total_update_bytes: total,
        avg_update_bytes: total,
        doc_size: snapshot.encoded_state.len(),
    };
    Ok((row, failure))
}

pub fn run(ctx: &ScenarioContext) -> Result<Findings, ScenarioError> {
    let mut words = ctx.words();
    let mut findings = Findings::default();
    for &size in &ctx.config.bench.sweep_sizes {
        let (row, failure) = measure(ctx.factory.as_ref(), size, &mut words)?;
        info!(
            size,
            local_ms = row.local_op_time_ms,
            apply_ms = row.remote_apply_time_ms,
            doc_size = row.doc_size,
            "edit size measured"
        );
        findings.sweep.push(row);
        if let Some(e) = failure {
            findings.fail(e);
        }
    }
    Ok(findings)
}
