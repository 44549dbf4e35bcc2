//! Text body carried in a relay message.
//!
//! Two shapes are understood:
//!
//! - **wrapped**: a JSON object `{"runId": "...", "id": 3, "b64": "<frame>"}`.
//!   The payload key declares the encoding; `data` is accepted as an alias
//!   written by older senders. `runId` and `id` are optional on input.
//! - **bare**: the base64 frame on its own, with no run tag.
//!
//! The shape is decided by the first non-whitespace character: `{` means
//! wrapped and must parse as such, anything else is a bare frame.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CodecError, Result};
use crate::frame::{Frame, MessageCodec};

/// Identity of one benchmark run.
///
/// Messages left on a shared group channel by an earlier run carry a
/// different id and are filtered out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Fresh random run id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload field of a wrapped body. The key names the encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WirePayload {
    /// `"b64"`: base64 update frame.
    B64(String),
    /// `"data"`: base64 update frame, legacy key.
    Data(String),
}

impl WirePayload {
    /// The base64 text regardless of key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::B64(s) | Self::Data(s) => s,
        }
    }
}

/// JSON wrapper around a base64 frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedBody {
    /// Run that produced the update.
    #[serde(rename = "runId", default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    /// Update id, duplicated from the frame for cheap inspection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// The frame itself.
    #[serde(flatten)]
    pub payload: WirePayload,
}

/// A relay message body in either accepted shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// Base64 frame with no run tag.
    Bare(String),
    /// JSON-wrapped frame.
    Wrapped(WrappedBody),
}

impl MessageBody {
    /// Build the body a sender places on the relay.
    #[must_use]
    pub fn wrap(run_id: &RunId, id: u64, update: &[u8]) -> Self {
        Self::Wrapped(WrappedBody {
            run_id: Some(run_id.clone()),
            id: Some(id),
            payload: WirePayload::B64(MessageCodec::encode_text(id, update)),
        })
    }

    /// Classify and parse a message text.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.starts_with('{') {
            let wrapped: WrappedBody = serde_json::from_str(trimmed).map_err(CodecError::Body)?;
            Ok(Self::Wrapped(wrapped))
        } else {
            Ok(Self::Bare(trimmed.to_owned()))
        }
    }

    /// Parse a body that arrived as a JSON value rather than text.
    ///
    /// Strings go through [`parse`](Self::parse); objects must be a
    /// wrapper. An object carrying only `data` has no run tag, like a bare
    /// frame.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::String(text) => Self::parse(&text),
            other => serde_json::from_value(other)
                .map(Self::Wrapped)
                .map_err(CodecError::Body),
        }
    }

    /// Run tag, if the body carries one.
    #[must_use]
    pub fn run_id(&self) -> Option<&RunId> {
        match self {
            Self::Bare(_) => None,
            Self::Wrapped(w) => w.run_id.as_ref(),
        }
    }

    /// Id declared outside the frame, if any.
    #[must_use]
    pub fn declared_id(&self) -> Option<u64> {
        match self {
            Self::Bare(_) => None,
            Self::Wrapped(w) => w.id,
        }
    }

    /// The base64 frame text.
    #[must_use]
    pub fn payload_b64(&self) -> &str {
        match self {
            Self::Bare(s) => s,
            Self::Wrapped(w) => w.payload.as_str(),
        }
    }

    /// Decode the frame and check it against the declared id.
    pub fn decode_frame(&self) -> Result<Frame> {
        let frame = MessageCodec::decode_text(self.payload_b64())?;
        match self.declared_id() {
            Some(declared) if declared != frame.id => Err(CodecError::IdMismatch {
                declared,
                framed: frame.id,
            }),
            _ => Ok(frame),
        }
    }

    /// Text to hand to the relay.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Bare(s) => s.clone(),
            Self::Wrapped(w) => {
                let mut obj = serde_json::Map::new();
                if let Some(run_id) = &w.run_id {
                    obj.insert("runId".into(), run_id.as_str().into());
                }
                if let Some(id) = w.id {
                    obj.insert("id".into(), id.into());
                }
                let (key, value) = match &w.payload {
                    WirePayload::B64(s) => ("b64", s),
                    WirePayload::Data(s) => ("data", s),
                };
                obj.insert(key.into(), value.as_str().into());
                serde_json::Value::Object(obj).to_string()
            }
        }
    }
}
