//! # relay-proto
//!
//! Wire-level types for shipping CRDT updates through a group-messaging
//! relay such as the signal-cli daemon.
//!
//! ## Layers
//!
//! ```text
//! update bytes ──► frame (version | id | bytes) ──► base64 ──► message body JSON
//!                                                              {"runId","id","b64"}
//!                                                                     │
//!                    relay event record ◄── envelope ◄── dataMessage.message
//! ```
//!
//! - [`frame`]: the binary framing of one `(id, update)` pair ([`MessageCodec`]).
//! - [`body`]: the text body placed in a relay message ([`MessageBody`]).
//! - [`event`]: line-delimited event records delivered by the relay ([`EventRecord`], [`Envelope`]).
//! - [`rpc`]: JSON-RPC 2.0 request/response shapes and rate-limit metadata ([`RateLimit`]).
//!
//! ## Quick Start
//!
//! ```rust
//! use relay_proto::{MessageBody, MessageCodec, RunId};
//!
//! let run = RunId::generate();
//! let body = MessageBody::wrap(&run, 7, b"update");
//! let text = body.to_text();
//!
//! let parsed = MessageBody::parse(&text).expect("valid body");
//! assert_eq!(parsed.run_id(), Some(&run));
//! let frame = parsed.decode_frame().expect("valid frame");
//! assert_eq!(frame.id, 7);
//! assert_eq!(&frame.update[..], b"update");
//! # let _ = MessageCodec::VERSION;
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod body;
pub mod error;
pub mod event;
pub mod frame;
pub mod rpc;

pub use self::body::{MessageBody, RunId, WirePayload, WrappedBody};
pub use self::error::{CodecError, EventError};
pub use self::event::{DataMessage, Envelope, EventRecord, GroupInfo, RawEnvelope, RawMessage};
pub use self::frame::{Frame, MessageCodec};
pub use self::rpc::{RateLimit, RpcError, RpcRequest, RpcResponse};
