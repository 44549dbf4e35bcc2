//! Per-update timing and size rows.

use std::fmt::Write as _;

use dashmap::DashMap;
use serde::Serialize;

/// Column order of the per-scenario CSV.
pub const CSV_HEADER: &str =
    "id,sender,sendingTimestamp,updateSize,envelopeTimestamp,receivingTimestamp,applyTime";

/// Everything measured about one logical update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsRow {
    pub id: u64,
    pub sender: String,
    pub sending_timestamp: Option<i64>,
    pub update_size: Option<usize>,
    pub envelope_timestamp: Option<i64>,
    pub receiving_timestamp: Option<i64>,
    /// Milliseconds spent in `apply_remote`.
    pub apply_time: Option<f64>,
}

impl MetricsRow {
    fn new(id: u64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// One CSV line, empty fields for missing values.
    pub fn to_csv_line(&self) -> String {
        fn opt<T: ToString>(v: Option<T>) -> String {
            v.map(|v| v.to_string()).unwrap_or_default()
        }
        format!(
            "{},{},{},{},{},{},{}",
            self.id,
            self.sender,
            opt(self.sending_timestamp),
            opt(self.update_size),
            opt(self.envelope_timestamp),
            opt(self.receiving_timestamp),
            opt(self.apply_time),
        )
    }
}

/// Rows keyed by update id. Every record call upserts, so the send,
/// receive and apply paths may report in any order.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    rows: DashMap<u64, MetricsRow>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self, id: u64, sender: &str, size: usize, sent_at: i64) {
        let mut row = self.rows.entry(id).or_insert_with(|| MetricsRow::new(id));
        row.sender = sender.to_string();
        row.update_size = Some(size);
        row.sending_timestamp = Some(sent_at);
    }

    pub fn record_received(&self, id: u64, received_at: i64, envelope_ts: i64) {
        let mut row = self.rows.entry(id).or_insert_with(|| MetricsRow::new(id));
        row.receiving_timestamp = Some(received_at);
        row.envelope_timestamp = Some(envelope_ts);
    }

    pub fn record_applied(&self, id: u64, apply_ms: f64) {
        self.rows
            .entry(id)
            .or_insert_with(|| MetricsRow::new(id))
            .apply_time = Some(apply_ms);
    }

    /// All rows, ids ascending.
    pub fn export(&self) -> Vec<MetricsRow> {
        let mut rows: Vec<MetricsRow> = self.rows.iter().map(|r| r.value().clone()).collect();
        rows.sort_unstable_by_key(|r| r.id);
        rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn received_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.receiving_timestamp.is_some())
            .count()
    }

    pub fn applied_count(&self) -> usize {
        self.rows.iter().filter(|r| r.apply_time.is_some()).count()
    }

    pub fn total_bytes_sent(&self) -> usize {
        self.rows.iter().filter_map(|r| r.update_size).sum()
    }

    pub fn mean_apply_ms(&self) -> Option<f64> {
        let times: Vec<f64> = self.rows.iter().filter_map(|r| r.apply_time).collect();
        if times.is_empty() {
            None
        } else {
            Some(times.iter().sum::<f64>() / times.len() as f64)
        }
    }

    pub fn to_csv(&self) -> String {
        to_csv(&self.export())
    }
}

/// Header plus one line per row.
pub fn to_csv(rows: &[MetricsRow]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for row in rows {
        let _ = writeln!(out, "{}", row.to_csv_line());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stages_merge_into_one_row() {
        let collector = MetricsCollector::new();
        collector.record_received(7, 1_200, 1_100);
        collector.record_sent(7, "+1", 42, 1_000);
        collector.record_applied(7, 0.5);

        let rows = collector.export();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0],
            MetricsRow {
                id: 7,
                sender: "+1".into(),
                sending_timestamp: Some(1_000),
                update_size: Some(42),
                envelope_timestamp: Some(1_100),
                receiving_timestamp: Some(1_200),
                apply_time: Some(0.5),
            }
        );
    }

    #[test]
    fn test_csv_leaves_missing_fields_empty() {
        let collector = MetricsCollector::new();
        collector.record_sent(2, "+1", 10, 500);
        collector.record_sent(1, "+1", 12, 400);
        collector.record_received(1, 700, 600);

        let csv = collector.to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "1,+1,400,12,600,700,");
        assert_eq!(lines[2], "2,+1,500,10,,,");
    }

    #[test]
    fn test_aggregates() {
        let collector = MetricsCollector::new();
        assert_eq!(collector.mean_apply_ms(), None);
        for id in 1..=4 {
            collector.record_sent(id, "+1", 10, 0);
        }
        collector.record_received(1, 5, 1);
        collector.record_received(2, 5, 1);
        collector.record_applied(1, 1.0);
        collector.record_applied(2, 3.0);

        assert_eq!(collector.len(), 4);
        assert_eq!(collector.received_count(), 2);
        assert_eq!(collector.applied_count(), 2);
        assert_eq!(collector.total_bytes_sent(), 40);
        assert_eq!(collector.mean_apply_ms(), Some(2.0));
    }
}
