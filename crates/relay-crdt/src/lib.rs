//! Replicated text documents for relay benchmarks.
//!
//! The benchmark harness never looks inside an engine. It talks to it
//! through two traits:
//!
//! - [`TextDocument`]: one replica. Local edits emit opaque update bytes
//!   through a callback; remote update bytes are merged with
//!   [`TextDocument::apply_update`].
//! - [`DocumentFactory`]: creates empty replicas or loads one from an
//!   encoded state.
//!
//! [`RgaDocument`] is the reference engine: a replicated growable array
//! of characters ordered by [`OpId`]s drawn from a [`LamportClock`].
//!
//! ```text
//!  replica A                                  replica B
//! ┌────────────────┐  update bytes (msgpack) ┌────────────────┐
//! │ insert_text()  │ ──────── relay ───────► │ apply_update() │
//! │ on_update(cb)  │ ◄─────── relay ──────── │ on_update(cb)  │
//! └────────────────┘                         └────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use relay_crdt::{DocumentFactory, RgaFactory};
//!
//! let outbox = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&outbox);
//! let factory = RgaFactory;
//! let mut a = factory.create(Box::new(move |u: &[u8]| sink.lock().unwrap().push(u.to_vec())));
//! let mut b = factory.create(Box::new(|_: &[u8]| {}));
//!
//! a.insert_text(0, "hello").unwrap();
//! for update in outbox.lock().unwrap().iter() {
//!     b.apply_update(update).unwrap();
//! }
//! assert_eq!(b.text(), "hello");
//! ```

pub mod clock;
pub mod error;
pub mod rga;
pub mod traits;

pub use clock::{LamportClock, OpId};
pub use error::DocError;
pub use rga::{RgaDocument, RgaFactory};
pub use traits::{DocumentFactory, TextDocument, UpdateCallback};
