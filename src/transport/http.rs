//! signal-cli JSON-RPC daemon over HTTP.
//!
//! - `POST <url>/api/v1/rpc` for `send` and `receive`
//! - `GET <url>/api/v1/events` for the server-sent event feed

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt, future};
use relay_proto::{EventRecord, RpcError, RpcRequest, RpcResponse};
use reqwest::header::ACCEPT;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

use super::{RecordStream, Relay};
use crate::error::RelayError;
use crate::metrics;

pub struct HttpRelay {
    client: reqwest::Client,
    rpc_url: String,
    events_url: String,
    next_id: AtomicU64,
}

impl HttpRelay {
    pub fn new(base_url: &str) -> Result<Self, RelayError> {
        let base = base_url.trim_end_matches('/');
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            rpc_url: format!("{base}/api/v1/rpc"),
            events_url: format!("{base}/api/v1/events"),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<P: Serialize + Send, T: DeserializeOwned + Send + Default>(
        &self,
        method: &str,
        params: P,
    ) -> Result<Option<T>, RelayError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(method, params, id);
        let response: RpcResponse<T> = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        match response.error {
            Some(err) => Err(map_rpc_error(err)),
            None => Ok(response.result),
        }
    }
}

/// Rate-limit refusals keep their metadata; everything else is a
/// transport error.
pub fn map_rpc_error(err: RpcError) -> RelayError {
    match err.rate_limit() {
        Some(limit) => RelayError::RateLimited(limit),
        None => RelayError::Transport(err.to_string()),
    }
}

#[async_trait]
impl Relay for HttpRelay {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send(&self, account: &str, group_id: &str, message: &str) -> Result<(), RelayError> {
        let params = json!({
            "account": account,
            "groupId": group_id,
            "message": message,
        });
        self.call::<_, Value>("send", params).await?;
        Ok(())
    }

    async fn receive(
        &self,
        account: &str,
        max_messages: u32,
        timeout: Duration,
    ) -> Result<Vec<EventRecord>, RelayError> {
        let params = json!({
            "account": account,
            "timeout": timeout.as_secs(),
            "maxMessages": max_messages,
        });
        let values = self
            .call::<_, Vec<Value>>("receive", params)
            .await?
            .unwrap_or_default();
        let records = decode_records(values);
        debug!(count = records.len(), "received records");
        Ok(records)
    }

    async fn subscribe(&self, account: Option<&str>) -> Result<RecordStream, RelayError> {
        let mut request = self
            .client
            .get(&self.events_url)
            .header(ACCEPT, "text/event-stream");
        if let Some(account) = account {
            request = request.query(&[("account", account)]);
        }
        let response = request.send().await?.error_for_status()?;
        let body = response.bytes_stream().map_err(io::Error::other);
        let lines = FramedRead::new(StreamReader::new(body), LinesCodec::new());
        let mut decoder = SseDecoder::default();
        let records = lines.filter_map(move |line| {
            let item = match line {
                Ok(line) => decoder.push_line(&line).and_then(|data| {
                    match EventRecord::parse_line(&data) {
                        Ok(record) => record.map(Ok),
                        Err(e) => Some(Err(RelayError::Transport(format!("bad event: {e}")))),
                    }
                }),
                Err(e) => Some(Err(RelayError::Transport(e.to_string()))),
            };
            future::ready(item)
        });
        Ok(records.boxed())
    }
}

/// Convert a `receive` result one record at a time. The daemon has
/// already dequeued the whole batch, so a record that does not parse is
/// logged and dropped without taking the others with it.
fn decode_records(values: Vec<Value>) -> Vec<EventRecord> {
    values
        .into_iter()
        .filter_map(|value| match EventRecord::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "dropping unreadable event record");
                metrics::record_filtered("bad_record");
                None
            }
        })
        .collect()
}

/// Incremental server-sent events parser.
///
/// Feeds on lines without their terminator and yields the `data` of each
/// completed `receive` event (or unnamed event).
#[derive(Debug, Default)]
struct SseDecoder {
    event: Option<String>,
    data: String,
}

impl SseDecoder {
    fn push_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            let event = self.event.take();
            let data = std::mem::take(&mut self.data);
            if data.is_empty() {
                return None;
            }
            return match event.as_deref() {
                None | Some("receive") | Some("message") => Some(data),
                Some(_) => None,
            };
        }
        if let Some(rest) = line.strip_prefix("data:") {
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        } else if let Some(rest) = line.strip_prefix("event:") {
            self.event = Some(rest.trim().to_string());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_receive_event() {
        let mut decoder = SseDecoder::default();
        assert_eq!(decoder.push_line("event: receive"), None);
        assert_eq!(decoder.push_line("data: {\"a\":1}"), None);
        assert_eq!(decoder.push_line(""), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn test_sse_multiline_data_and_comments() {
        let mut decoder = SseDecoder::default();
        decoder.push_line(": keep-alive");
        decoder.push_line("id: 7");
        decoder.push_line("data:{\"a\":");
        decoder.push_line("data:1}");
        assert_eq!(decoder.push_line(""), Some("{\"a\":\n1}".to_string()));
        assert_eq!(decoder.push_line(""), None);
    }

    #[test]
    fn test_sse_other_events_are_skipped() {
        let mut decoder = SseDecoder::default();
        decoder.push_line("event: ping");
        decoder.push_line("data: {}");
        assert_eq!(decoder.push_line(""), None);
    }

    #[test]
    fn test_rpc_error_mapping() {
        let limited = RpcError {
            code: -5,
            message: "rate limit".into(),
            data: Some(json!({"retryAfter": 3})),
        };
        assert!(matches!(
            map_rpc_error(limited),
            RelayError::RateLimited(l) if l.wait_seconds == Some(3)
        ));

        let other = RpcError {
            code: -32602,
            message: "invalid params".into(),
            data: None,
        };
        assert!(matches!(map_rpc_error(other), RelayError::Transport(_)));
    }

    #[test]
    fn test_bad_record_does_not_sink_the_batch() {
        let frame = relay_proto::MessageCodec::encode_text(1, b"u");
        let record = |message: Value| {
            json!({"envelope": {"source": "+1", "timestamp": 5, "dataMessage": {
                "timestamp": 5, "message": message, "groupInfo": {"groupId": "g"}}}})
        };
        let values = vec![
            record(json!({"runId": "r", "id": 1, "b64": frame})),
            json!({"envelope": {"timestamp": "yesterday"}}),
            record(json!(frame)),
        ];
        let records = decode_records(values);
        assert_eq!(records.len(), 2);
        let envelopes: Vec<_> = records
            .into_iter()
            .map(|r| r.into_envelope().unwrap().unwrap())
            .collect();
        assert_eq!(envelopes[0].body.run_id().map(|r| r.as_str()), Some("r"));
        assert_eq!(envelopes[1].body.run_id(), None);
    }

    #[test]
    fn test_urls() {
        let relay = HttpRelay::new("http://localhost:8080/").unwrap();
        assert_eq!(relay.rpc_url, "http://localhost:8080/api/v1/rpc");
        assert_eq!(relay.events_url, "http://localhost:8080/api/v1/events");
    }
}
