//! Relay event records.
//!
//! The relay delivers one JSON record per line (poll output, SSE `data:`
//! frames, or the elements of a JSON-RPC `receive` result):
//!
//! ```json
//! {"account":"+100","envelope":{"source":"+200","timestamp":1700000000000,
//!   "dataMessage":{"timestamp":1700000000000,"message":"{...}",
//!     "groupInfo":{"groupId":"abc=","type":"DELIVER"}}}}
//! ```
//!
//! Only the fields below are read; everything else is ignored.

use serde::Deserialize;

use crate::body::MessageBody;
use crate::error::{CodecError, EventError};

/// One record as produced by the relay.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Receiving account, set by multi-account daemons.
    #[serde(default)]
    pub account: Option<String>,
    /// The envelope, absent on receipts and other housekeeping records.
    #[serde(default)]
    pub envelope: Option<RawEnvelope>,
}

/// Envelope as delivered by the relay.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEnvelope {
    /// Sender account.
    #[serde(default)]
    pub source: Option<String>,
    /// Sender number, used when `source` is missing.
    #[serde(default)]
    pub source_number: Option<String>,
    /// Envelope timestamp (ms since epoch).
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// When the relay server accepted the message.
    #[serde(default)]
    pub server_received_timestamp: Option<i64>,
    /// When the relay server handed the message out.
    #[serde(default)]
    pub server_delivered_timestamp: Option<i64>,
    /// Content, absent on receipts and typing indicators.
    #[serde(default)]
    pub data_message: Option<DataMessage>,
}

/// Data message content.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataMessage {
    /// Sender-side timestamp (ms since epoch).
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Message text or object.
    #[serde(default)]
    pub message: Option<RawMessage>,
    /// Group the message was posted to.
    #[serde(default)]
    pub group_info: Option<GroupInfo>,
}

/// Group metadata.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    /// Group identifier.
    pub group_id: String,
    /// Delivery type (e.g. `DELIVER`, `UPDATE`).
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// The `message` field: a string on current relays, a JSON object
/// (`{"runId","id","b64"|"data"}`, or just `{"data"}` on older relays)
/// otherwise.
///
/// Any JSON value is accepted here so that one odd message never fails
/// the record around it; the shape is checked in
/// [`EventRecord::into_envelope`].
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawMessage {
    /// Plain text body.
    Text(String),
    /// Structured body.
    Object(serde_json::Value),
}

/// The fields of an inbound message the benchmark reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Receiving account, when the relay reports it.
    pub account: Option<String>,
    /// Sender account.
    pub sender: String,
    /// Group the message was posted to; `None` for direct messages.
    pub group_id: Option<String>,
    /// Sender-side timestamp (ms since epoch).
    pub timestamp: i64,
    /// Relay server receive timestamp.
    pub server_received_timestamp: Option<i64>,
    /// Relay server delivery timestamp.
    pub server_delivered_timestamp: Option<i64>,
    /// Parsed message body.
    pub body: MessageBody,
}

impl EventRecord {
    /// Parse one line of relay output. Blank lines yield `Ok(None)`.
    pub fn parse_line(line: &str) -> Result<Option<Self>, EventError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(line)?))
    }

    /// Convert one element of a JSON-RPC `receive` result.
    pub fn from_value(value: serde_json::Value) -> Result<Self, EventError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Extract the envelope of a data message.
    ///
    /// Returns `Ok(None)` for records that carry no message text (receipts,
    /// typing indicators, group updates). A message whose body does not
    /// parse is an error so the caller can count and log it.
    pub fn into_envelope(self) -> Result<Option<Envelope>, CodecError> {
        let Some(raw) = self.envelope else {
            return Ok(None);
        };
        let Some(data) = raw.data_message else {
            return Ok(None);
        };
        let body = match data.message {
            None => return Ok(None),
            Some(RawMessage::Text(text)) => MessageBody::parse(&text)?,
            Some(RawMessage::Object(value)) => MessageBody::from_value(value)?,
        };
        Ok(Some(Envelope {
            account: self.account,
            sender: raw.source.or(raw.source_number).unwrap_or_default(),
            group_id: data.group_info.map(|g| g.group_id),
            timestamp: data.timestamp.or(raw.timestamp).unwrap_or_default(),
            server_received_timestamp: raw.server_received_timestamp,
            server_delivered_timestamp: raw.server_delivered_timestamp,
            body,
        }))
    }
}
