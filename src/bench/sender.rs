//! Fixed-size pool of sender tasks.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::collector::MetricsCollector;
use crate::config::BenchConfig;
use crate::error::ScenarioError;
use crate::telemetry::now_ms;
use crate::transport::TransportBridge;

/// One update waiting to be sent.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub id: u64,
    pub account: String,
    pub update: Bytes,
}

/// Send results summed over workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SendStats {
    pub delivered: usize,
    pub failed: usize,
    pub attempts: u64,
}

impl SendStats {
    pub fn merge(&mut self, other: SendStats) {
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.attempts += other.attempts;
    }
}

/// Send one update under the retry policy and account for it.
pub(crate) async fn send_one(
    bridge: &TransportBridge,
    collector: &MetricsCollector,
    item: &Outgoing,
    max_attempts: u32,
    retry: Duration,
    stats: &mut SendStats,
) {
    collector.record_sent(item.id, &item.account, item.update.len(), now_ms());
    match bridge
        .send_with_retry(&item.account, item.id, &item.update, max_attempts, retry)
        .await
    {
        Ok(attempts) => {
            debug!(id = item.id, attempts, size = item.update.len(), "sent update");
            stats.delivered += 1;
            stats.attempts += u64::from(attempts);
        }
        Err(e) => {
            warn!(id = item.id, error = %e, "update not delivered");
            stats.failed += 1;
            stats.attempts += u64::from(max_attempts);
        }
    }
}

/// Workers pull from one shared queue, so at most `send_concurrency`
/// sends are in flight.
pub struct SendPool {
    tx: mpsc::Sender<Outgoing>,
    workers: JoinSet<SendStats>,
}

impl SendPool {
    pub fn spawn(
        bridge: Arc<TransportBridge>,
        collector: Arc<MetricsCollector>,
        bench: &BenchConfig,
    ) -> Self {
        let concurrency = bench.send_concurrency.max(1);
        let (tx, rx) = mpsc::channel::<Outgoing>(concurrency * 2);
        let rx = Arc::new(Mutex::new(rx));
        let max_attempts = bench.max_send_attempts;
        let retry = bench.send_retry();

        let mut workers = JoinSet::new();
        for worker in 0..concurrency {
            let rx = Arc::clone(&rx);
            let bridge = Arc::clone(&bridge);
            let collector = Arc::clone(&collector);
            workers.spawn(async move {
                let mut stats = SendStats::default();
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(item) = next else { break };
                    send_one(&bridge, &collector, &item, max_attempts, retry, &mut stats).await;
                }
                debug!(worker, delivered = stats.delivered, "send worker done");
                stats
            });
        }
        Self { tx, workers }
    }

    /// Queue an update, waiting while every worker is busy.
    pub async fn submit(&self, item: Outgoing) -> Result<(), ScenarioError> {
        self.tx
            .send(item)
            .await
            .map_err(|_| ScenarioError::Task("send pool closed".into()))
    }

    /// Close the queue and wait for every queued update to be sent.
    pub async fn finish(self) -> Result<SendStats, ScenarioError> {
        let Self { tx, mut workers } = self;
        drop(tx);
        let mut total = SendStats::default();
        while let Some(joined) = workers.join_next().await {
            total.merge(joined?);
        }
        Ok(total)
    }
}
