//! Session filtering and the benchmark-facing transport surface.
//!
//! Every inbound record, polled or pushed, goes through
//! [`Session::accept`]: records without a data message, from another
//! group, from another run or older than the session are dropped, and
//! bodies that fail to decode are logged and dropped. What survives is a
//! [`DecodedUpdate`].

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use relay_proto::{CodecError, EventRecord, MessageBody, RunId};
use tracing::{Instrument, debug, warn};

use super::{ListenerHandle, Relay};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::metrics;
use crate::telemetry::{now_ms, spans};

/// An update recovered from the relay, with what the metrics need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedUpdate {
    pub id: u64,
    pub update: Bytes,
    pub sender: String,
    /// Sender-side timestamp from the envelope (ms).
    pub envelope_ts: i64,
    pub server_received_ts: Option<i64>,
    pub server_delivered_ts: Option<i64>,
    /// Local wall clock when the record was read (ms).
    pub received_at: i64,
}

/// Why a record was dropped.
#[derive(Debug)]
pub enum Rejection {
    /// Receipt, typing indicator or other record without message text.
    NoMessage,
    WrongGroup,
    /// Different run id, or no run id while the filter is strict.
    WrongRun,
    /// Sent before this session started.
    Stale,
    Malformed(CodecError),
}

impl Rejection {
    /// Static label for the filtered-envelope counter.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NoMessage => "no_message",
            Self::WrongGroup => "wrong_group",
            Self::WrongRun => "wrong_run",
            Self::Stale => "stale",
            Self::Malformed(e) => e.error_code(),
        }
    }
}

/// Identity of one scenario on the relay.
#[derive(Debug, Clone)]
pub struct Session {
    pub run_id: RunId,
    pub group_id: String,
    /// Envelopes older than this (ms) belong to an earlier run.
    pub started_at_ms: i64,
    /// Reject bodies that carry no run id.
    pub strict: bool,
}

impl Session {
    /// A session with a fresh run id, starting now.
    pub fn start(group_id: impl Into<String>, strict: bool) -> Self {
        Self {
            run_id: RunId::generate(),
            group_id: group_id.into(),
            started_at_ms: now_ms(),
            strict,
        }
    }

    /// Filter and decode one record.
    pub fn accept(&self, record: EventRecord, received_at: i64) -> Result<DecodedUpdate, Rejection> {
        let envelope = record
            .into_envelope()
            .map_err(Rejection::Malformed)?
            .ok_or(Rejection::NoMessage)?;
        if envelope.group_id.as_deref() != Some(self.group_id.as_str()) {
            return Err(Rejection::WrongGroup);
        }
        match envelope.body.run_id() {
            Some(run) if *run != self.run_id => return Err(Rejection::WrongRun),
            None if self.strict => return Err(Rejection::WrongRun),
            _ => {}
        }
        if envelope.timestamp < self.started_at_ms {
            return Err(Rejection::Stale);
        }
        let frame = envelope.body.decode_frame().map_err(Rejection::Malformed)?;
        Ok(DecodedUpdate {
            id: frame.id,
            update: frame.update,
            sender: envelope.sender,
            envelope_ts: envelope.timestamp,
            server_received_ts: envelope.server_received_timestamp,
            server_delivered_ts: envelope.server_delivered_timestamp,
            received_at,
        })
    }

    /// [`accept`](Self::accept), logging and counting drops.
    pub fn filter(&self, record: EventRecord, received_at: i64) -> Option<DecodedUpdate> {
        metrics::record_envelope();
        match self.accept(record, received_at) {
            Ok(update) => Some(update),
            Err(rejection) => {
                metrics::record_filtered(rejection.reason());
                match &rejection {
                    Rejection::Malformed(e) => warn!(error = %e, "dropping malformed payload"),
                    other => debug!(reason = other.reason(), "dropping envelope"),
                }
                None
            }
        }
    }
}

/// Sends updates for one session and turns relay traffic back into
/// [`DecodedUpdate`]s.
pub struct TransportBridge {
    relay: Arc<dyn Relay>,
    session: Arc<Session>,
    max_messages: u32,
    receive_timeout: Duration,
    pacing: Option<DefaultDirectRateLimiter>,
}

impl TransportBridge {
    pub fn new(relay: Arc<dyn Relay>, session: Session, config: &RelayConfig) -> Self {
        let pacing = config
            .send_rate_per_second
            .and_then(NonZeroU32::new)
            .map(|rate| RateLimiter::direct(Quota::per_second(rate)));
        Self {
            relay,
            session: Arc::new(session),
            max_messages: config.max_messages,
            receive_timeout: Duration::from_secs(config.receive_timeout_secs),
            pacing,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// One send attempt.
    pub async fn send(&self, account: &str, id: u64, update: &[u8]) -> Result<(), RelayError> {
        if let Some(pacing) = &self.pacing {
            pacing.until_ready().await;
        }
        let body = MessageBody::wrap(&self.session.run_id, id, update).to_text();
        let result = self
            .relay
            .send(account, &self.session.group_id, &body)
            .instrument(spans::relay_call(self.relay.name(), "send", account))
            .await;
        match &result {
            Ok(()) => metrics::record_sent(),
            Err(e) => {
                metrics::record_send_failure(e.error_code());
                if matches!(e, RelayError::RateLimited(_)) {
                    metrics::record_rate_limited();
                }
            }
        }
        result
    }

    /// Send with the retry policy: rate limits wait for the relay's hint,
    /// transport errors for `retry_delay`. Returns the number of attempts
    /// used, or the last error once `max_attempts` are spent.
    pub async fn send_with_retry(
        &self,
        account: &str,
        id: u64,
        update: &[u8],
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Result<u32, RelayError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.send(account, id, update).await {
                Ok(()) => return Ok(attempt),
                Err(e) => e,
            };
            if attempt >= max_attempts {
                warn!(id, attempts = attempt, error = %err, "giving up on update");
                return Err(err);
            }
            let delay = match &err {
                RelayError::RateLimited(limit) => {
                    warn!(
                        id,
                        challenge = limit.challenge.as_deref().unwrap_or("n/a"),
                        options = %limit.options.join(","),
                        wait = ?limit.wait_seconds,
                        "relay rate limit on send"
                    );
                    limit.wait_seconds.map_or(retry_delay, Duration::from_secs)
                }
                RelayError::Unsupported(_) => return Err(err),
                RelayError::Transport(e) => {
                    warn!(id, attempt, error = %e, "send failed, retrying");
                    retry_delay
                }
            };
            tokio::time::sleep(delay).await;
        }
    }

    /// Poll once and return the updates that pass the session filter.
    pub async fn receive_batch(&self, account: &str) -> Result<Vec<DecodedUpdate>, RelayError> {
        let records = self
            .relay
            .receive(account, self.max_messages, self.receive_timeout)
            .instrument(spans::relay_call(self.relay.name(), "receive", account))
            .await
            .inspect_err(|e| {
                if matches!(e, RelayError::RateLimited(_)) {
                    metrics::record_rate_limited();
                }
            })?;
        let received_at = now_ms();
        Ok(records
            .into_iter()
            .filter_map(|record| self.session.filter(record, received_at))
            .collect())
    }

    /// Start a push listener for `account` (or every account).
    pub async fn subscribe(&self, account: Option<&str>) -> Result<ListenerHandle, RelayError> {
        let stream = self.relay.subscribe(account).await?;
        Ok(ListenerHandle::spawn(stream, Arc::clone(&self.session)))
    }
}
