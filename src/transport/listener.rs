//! Push listener task.
//!
//! The listener owns the relay's record stream. It filters and decodes
//! each record through the [`Session`] and forwards the survivors over an
//! unbounded channel; the coordinator owns the receiving end. Nothing else
//! is shared between the two.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{DecodedUpdate, RecordStream, Session};
use crate::telemetry::now_ms;

/// Counters kept by the listener task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ListenerStats {
    pub forwarded: u64,
    pub dropped: u64,
    pub stream_errors: u64,
}

/// How the listener ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "exit", rename_all = "snake_case")]
pub enum ListenerExit {
    /// Finished within the shutdown timeout.
    Graceful(ListenerStats),
    /// Did not finish in time and was aborted.
    Aborted,
    /// Panicked or was cancelled by the runtime.
    Failed,
}

/// Handle to a running push listener.
pub struct ListenerHandle {
    updates: mpsc::UnboundedReceiver<DecodedUpdate>,
    cancel: CancellationToken,
    task: JoinHandle<ListenerStats>,
}

impl ListenerHandle {
    /// Spawn a listener consuming `stream`.
    pub fn spawn(stream: RecordStream, session: Arc<Session>) -> Self {
        let (tx, updates) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(listen(stream, session, tx, cancel.clone()));
        Self {
            updates,
            cancel,
            task,
        }
    }

    /// Next decoded update. `None` once the listener has stopped and the
    /// channel is drained.
    pub async fn recv(&mut self) -> Option<DecodedUpdate> {
        self.updates.recv().await
    }

    /// Signal the listener to stop, wait up to `timeout`, then abort it.
    pub async fn shutdown(mut self, timeout: Duration) -> ListenerExit {
        self.cancel.cancel();
        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(Ok(stats)) => {
                info!(
                    forwarded = stats.forwarded,
                    dropped = stats.dropped,
                    "listener stopped"
                );
                ListenerExit::Graceful(stats)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "listener task failed");
                ListenerExit::Failed
            }
            Err(_) => {
                warn!(?timeout, "listener did not stop in time, aborting");
                self.task.abort();
                ListenerExit::Aborted
            }
        }
    }
}

async fn listen(
    mut stream: RecordStream,
    session: Arc<Session>,
    tx: mpsc::UnboundedSender<DecodedUpdate>,
    cancel: CancellationToken,
) -> ListenerStats {
    let mut stats = ListenerStats::default();
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break,
            item = stream.next() => item,
        };
        match item {
            Some(Ok(record)) => match session.filter(record, now_ms()) {
                Some(update) => {
                    debug!(
                        id = update.id,
                        sender = %update.sender,
                        server_received = ?update.server_received_ts,
                        server_delivered = ?update.server_delivered_ts,
                        "forwarding update"
                    );
                    if tx.send(update).is_err() {
                        break;
                    }
                    stats.forwarded += 1;
                }
                None => stats.dropped += 1,
            },
            Some(Err(e)) => {
                stats.stream_errors += 1;
                warn!(error = %e, "event stream error");
            }
            None => {
                info!("event stream ended");
                break;
            }
        }
    }
    stats
}
