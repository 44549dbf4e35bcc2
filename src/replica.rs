//! One replica of the benchmarked document.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use relay_crdt::{DocError, DocumentFactory, TextDocument, UpdateCallback};

use crate::error::ScenarioError;
use crate::telemetry::StageTimer;

/// A primitive local edit. Positions count characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    Insert { pos: usize, text: String },
    Delete { pos: usize, len: usize },
}

/// The update produced by one local edit.
#[derive(Debug, Clone)]
pub struct LocalEdit {
    pub update: Bytes,
    pub elapsed: Duration,
}

/// Encoded replica state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaSnapshot {
    pub encoded_state: Bytes,
    /// Visible length in characters at encode time.
    pub text_len: usize,
}

/// Owns one document and captures the updates it emits.
pub struct ReplicaDriver {
    doc: Box<dyn TextDocument>,
    outbox: Arc<Mutex<Vec<Bytes>>>,
}

impl std::fmt::Debug for ReplicaDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaDriver")
            .field("len", &self.doc.len())
            .field("pending", &self.outbox.lock().len())
            .finish()
    }
}

impl ReplicaDriver {
    fn capture() -> (Arc<Mutex<Vec<Bytes>>>, UpdateCallback) {
        let outbox = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outbox);
        let callback: UpdateCallback =
            Box::new(move |update: &[u8]| sink.lock().push(Bytes::copy_from_slice(update)));
        (outbox, callback)
    }

    /// An empty replica.
    pub fn create(factory: &dyn DocumentFactory) -> Self {
        let (outbox, callback) = Self::capture();
        Self {
            doc: factory.create(callback),
            outbox,
        }
    }

    /// A replica initialized from `snapshot`.
    pub fn load(factory: &dyn DocumentFactory, snapshot: &ReplicaSnapshot) -> Result<Self, ScenarioError> {
        let (outbox, callback) = Self::capture();
        Ok(Self {
            doc: factory.load(callback, &snapshot.encoded_state)?,
            outbox,
        })
    }

    /// Apply `edits` as one transaction and return the single update it
    /// produced.
    pub fn apply_local_edit(&mut self, edits: &[EditOp]) -> Result<LocalEdit, ScenarioError> {
        self.outbox.lock().clear();
        let timer = StageTimer::new("local_edit");
        let result = self.doc.transact(&mut |doc| {
            for edit in edits {
                match edit {
                    EditOp::Insert { pos, text } => doc.insert_text(*pos, text)?,
                    EditOp::Delete { pos, len } => doc.delete_text(*pos, *len)?,
                }
            }
            Ok::<(), DocError>(())
        });
        let elapsed = timer.finish();

        let mut emitted = std::mem::take(&mut *self.outbox.lock());
        if let Err(source) = result {
            // The edits before the failure are in the document; hand their
            // update back so the caller can still ship it.
            return Err(match emitted.pop() {
                Some(update) if emitted.is_empty() => ScenarioError::PartialEdit { update, source },
                Some(_) => ScenarioError::SplitUpdate(emitted.len() + 1),
                None => ScenarioError::Doc(source),
            });
        }
        match emitted.len() {
            0 => Err(ScenarioError::NoUpdate),
            1 => Ok(LocalEdit {
                update: emitted.remove(0),
                elapsed,
            }),
            n => Err(ScenarioError::SplitUpdate(n)),
        }
    }

    /// Insert `text` at `pos`.
    pub fn insert(&mut self, pos: usize, text: &str) -> Result<LocalEdit, ScenarioError> {
        self.apply_local_edit(&[EditOp::Insert {
            pos,
            text: text.to_string(),
        }])
    }

    /// Merge an update from the other replica and return how long it took.
    pub fn apply_remote(&mut self, update: &[u8]) -> Result<Duration, ScenarioError> {
        let timer = StageTimer::new("apply");
        self.doc.apply_update(update)?;
        Ok(timer.finish())
    }

    pub fn snapshot(&self) -> Result<ReplicaSnapshot, ScenarioError> {
        Ok(ReplicaSnapshot {
            encoded_state: Bytes::from(self.doc.encode_state()?),
            text_len: self.doc.len(),
        })
    }

    pub fn text(&self) -> String {
        self.doc.text()
    }

    pub fn len(&self) -> usize {
        self.doc.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_crdt::RgaFactory;

    #[test]
    fn test_transaction_yields_one_update() {
        let mut a = ReplicaDriver::create(&RgaFactory);
        let edit = a
            .apply_local_edit(&[
                EditOp::Insert {
                    pos: 0,
                    text: "hello world".into(),
                },
                EditOp::Delete { pos: 5, len: 6 },
                EditOp::Insert {
                    pos: 5,
                    text: "!".into(),
                },
            ])
            .unwrap();
        assert_eq!(a.text(), "hello!");

        let mut b = ReplicaDriver::create(&RgaFactory);
        b.apply_remote(&edit.update).unwrap();
        assert_eq!(b.text(), "hello!");
    }

    #[test]
    fn test_empty_edit_is_an_error() {
        let mut a = ReplicaDriver::create(&RgaFactory);
        assert!(matches!(
            a.apply_local_edit(&[]),
            Err(ScenarioError::NoUpdate)
        ));
    }

    #[test]
    fn test_out_of_bounds_edit_fails() {
        let mut a = ReplicaDriver::create(&RgaFactory);
        let err = a.insert(3, "x").unwrap_err();
        assert_eq!(err.error_code(), "engine");
    }

    #[test]
    fn test_failed_edit_returns_its_partial_update() {
        let mut a = ReplicaDriver::create(&RgaFactory);
        let err = a
            .apply_local_edit(&[
                EditOp::Insert {
                    pos: 0,
                    text: "kept".into(),
                },
                EditOp::Delete { pos: 2, len: 10 },
            ])
            .unwrap_err();
        assert_eq!(err.error_code(), "partial_edit");
        let ScenarioError::PartialEdit { update, .. } = err else {
            panic!("expected a partial edit");
        };
        assert_eq!(a.text(), "kept");

        let mut b = ReplicaDriver::create(&RgaFactory);
        b.apply_remote(&update).unwrap();
        assert_eq!(b.text(), a.text());

        // The next edit starts from an empty outbox.
        let edit = a.insert(4, "!").unwrap();
        b.apply_remote(&edit.update).unwrap();
        assert_eq!(b.text(), "kept!");
    }

    #[test]
    fn test_snapshot_reload_and_remote_idempotence() {
        let mut a = ReplicaDriver::create(&RgaFactory);
        a.insert(0, "seed").unwrap();
        let snapshot = a.snapshot().unwrap();
        assert_eq!(snapshot.text_len, 4);

        let mut b = ReplicaDriver::load(&RgaFactory, &snapshot).unwrap();
        assert_eq!(b.text(), "seed");

        let edit = a.insert(4, "ed").unwrap();
        b.apply_remote(&edit.update).unwrap();
        b.apply_remote(&edit.update).unwrap();
        assert_eq!(b.text(), "seeded");
        assert_eq!(b.len(), 6);
    }

    #[test]
    fn test_remote_apply_emits_nothing() {
        let mut a = ReplicaDriver::create(&RgaFactory);
        let edit = a.insert(0, "x").unwrap();
        let mut b = ReplicaDriver::create(&RgaFactory);
        b.apply_remote(&edit.update).unwrap();
        assert!(b.outbox.lock().is_empty());
    }
}
