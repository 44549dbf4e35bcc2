//! In-process group relay for dry runs and tests.
//!
//! Every message posted to a group lands in the inbox of each member
//! account except its sender, and on a broadcast feed for push
//! subscribers. Members are the configured accounts plus any account that
//! polls or subscribes. Faults are injected per [`LoopbackConfig`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use relay_proto::{DataMessage, EventRecord, GroupInfo, RateLimit, RawEnvelope, RawMessage};
use tokio::sync::{Notify, broadcast};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, trace};

use super::{RecordStream, Relay};
use crate::config::LoopbackConfig;
use crate::error::RelayError;
use crate::telemetry::now_ms;

const FEED_CAPACITY: usize = 65_536;

struct Inner {
    config: LoopbackConfig,
    inboxes: Mutex<HashMap<String, VecDeque<EventRecord>>>,
    arrived: Notify,
    feed: broadcast::Sender<EventRecord>,
    sends: AtomicU64,
}

impl Inner {
    fn join(&self, account: &str) {
        self.inboxes.lock().entry(account.to_string()).or_default();
    }

    fn deliver(&self, sender: &str, record: &EventRecord, copies: usize) {
        let mut recipients = Vec::new();
        {
            let mut inboxes = self.inboxes.lock();
            for (account, inbox) in inboxes.iter_mut().filter(|(a, _)| a.as_str() != sender) {
                let mut copy = record.clone();
                copy.account = Some(account.clone());
                for _ in 0..copies {
                    inbox.push_back(copy.clone());
                }
                recipients.push(copy);
            }
        }
        for copy in recipients {
            for _ in 0..copies {
                // No subscribers is fine.
                let _ = self.feed.send(copy.clone());
            }
        }
        self.arrived.notify_waiters();
    }

    fn take(&self, account: &str, max_messages: u32) -> Vec<EventRecord> {
        let mut inboxes = self.inboxes.lock();
        let inbox = inboxes.entry(account.to_string()).or_default();
        let n = inbox.len().min(max_messages as usize);
        inbox.drain(..n).collect()
    }
}

/// Shared in-memory group channel.
#[derive(Clone)]
pub struct LoopbackRelay {
    inner: Arc<Inner>,
}

impl LoopbackRelay {
    pub fn new<I, S>(config: LoopbackConfig, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        let inboxes = members
            .into_iter()
            .map(Into::into)
            .filter(|m: &String| !m.is_empty())
            .map(|m| (m, VecDeque::new()))
            .collect();
        Self {
            inner: Arc::new(Inner {
                config,
                inboxes: Mutex::new(inboxes),
                arrived: Notify::new(),
                feed,
                sends: AtomicU64::new(0),
            }),
        }
    }

    /// Build the record the relay hands to recipients.
    fn record(sender: &str, group_id: &str, message: &str) -> EventRecord {
        let now = now_ms();
        EventRecord {
            account: None,
            envelope: Some(RawEnvelope {
                source: Some(sender.to_string()),
                source_number: Some(sender.to_string()),
                timestamp: Some(now),
                server_received_timestamp: Some(now),
                server_delivered_timestamp: Some(now),
                data_message: Some(DataMessage {
                    timestamp: Some(now),
                    message: Some(RawMessage::Text(message.to_string())),
                    group_info: Some(GroupInfo {
                        group_id: group_id.to_string(),
                        kind: Some("DELIVER".to_string()),
                    }),
                }),
            }),
        }
    }
}

fn every(n: u64, period: u32) -> bool {
    period > 0 && n % u64::from(period) == 0
}

#[async_trait]
impl Relay for LoopbackRelay {
    fn name(&self) -> &'static str {
        "loopback"
    }

    async fn send(&self, account: &str, group_id: &str, message: &str) -> Result<(), RelayError> {
        let config = &self.inner.config;
        let n = self.inner.sends.fetch_add(1, Ordering::Relaxed) + 1;
        if every(n, config.rate_limit_every) {
            debug!(n, "injecting rate limit");
            return Err(RelayError::RateLimited(RateLimit {
                challenge: Some(format!("loopback-challenge-{n}")),
                options: vec!["recaptcha".to_string()],
                wait_seconds: Some(0),
            }));
        }
        let copies = if every(n, config.duplicate_every) { 2 } else { 1 };
        let record = Self::record(account, group_id, message);
        let sender = account.to_string();
        if config.latency_ms > 0 {
            let inner = Arc::clone(&self.inner);
            let latency = Duration::from_millis(config.latency_ms);
            tokio::spawn(async move {
                tokio::time::sleep(latency).await;
                inner.deliver(&sender, &record, copies);
            });
        } else {
            self.inner.deliver(&sender, &record, copies);
        }
        trace!(n, copies, "loopback accepted message");
        Ok(())
    }

    async fn receive(
        &self,
        account: &str,
        max_messages: u32,
        timeout: Duration,
    ) -> Result<Vec<EventRecord>, RelayError> {
        self.inner.join(account);
        let deadline = tokio::time::Instant::now() + timeout;
        let mut batch = loop {
            let notified = self.inner.arrived.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let batch = self.inner.take(account, max_messages);
            if !batch.is_empty() || tokio::time::Instant::now() >= deadline {
                break batch;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                break self.inner.take(account, max_messages);
            }
        };
        if self.inner.config.reorder {
            batch.shuffle(&mut rand::thread_rng());
        }
        Ok(batch)
    }

    async fn subscribe(&self, account: Option<&str>) -> Result<RecordStream, RelayError> {
        if let Some(account) = account {
            self.inner.join(account);
        }
        let account = account.map(str::to_string);
        let rx = self.inner.feed.subscribe();
        let records = stream::unfold(rx, |mut rx| async move {
            match rx.recv().await {
                Ok(record) => Some((Ok(record), rx)),
                Err(RecvError::Lagged(n)) => Some((
                    Err(RelayError::Transport(format!("subscriber lagged by {n} records"))),
                    rx,
                )),
                Err(RecvError::Closed) => None,
            }
        })
        .filter(move |item| {
            let keep = match (item, &account) {
                (Ok(record), Some(account)) => record.account.as_deref() == Some(account.as_str()),
                _ => true,
            };
            futures_util::future::ready(keep)
        });
        Ok(records.boxed())
    }
}
