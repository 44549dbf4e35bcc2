//! Replicated growable array (RGA) of characters.
//!
//! Every character carries an [`OpId`]. A character is placed right after
//! its origin (the character it was typed after), skipping any characters
//! with a greater id that were inserted after the same origin
//! concurrently. Deleted characters stay in the array as tombstones so
//! later inserts can still find their origin.
//!
//! A local insertion of a string is one run op: the first character has
//! the op id, each further character the next counter, and each character
//! implicitly has its predecessor as origin.
//!
//! Ops that reference characters this replica has not seen yet are parked
//! and retried after every successful integration, so updates can be
//! applied in any order.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::{LamportClock, OpId};
use crate::error::DocError;
use crate::traits::{DocumentFactory, TextDocument, UpdateCallback};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum Op {
    Insert {
        id: OpId,
        origin: Option<OpId>,
        text: String,
    },
    Delete {
        targets: Vec<OpId>,
    },
}

#[derive(Serialize, Deserialize)]
struct Update {
    ops: Vec<Op>,
}

#[derive(Serialize, Deserialize)]
struct Segment {
    start: OpId,
    text: String,
    deleted: bool,
}

#[derive(Serialize, Deserialize)]
struct State {
    clock: u64,
    segments: Vec<Segment>,
    parked: Vec<Op>,
}

#[derive(Debug, Clone)]
struct Node {
    id: OpId,
    ch: char,
    deleted: bool,
}

/// Reference text engine.
pub struct RgaDocument {
    replica: u64,
    clock: LamportClock,
    nodes: Vec<Node>,
    known: HashSet<OpId>,
    visible: usize,
    parked: Vec<Op>,
    pending: Vec<Op>,
    depth: usize,
    on_update: UpdateCallback,
}

impl fmt::Debug for RgaDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RgaDocument")
            .field("replica", &self.replica)
            .field("clock", &self.clock)
            .field("nodes", &self.nodes.len())
            .field("visible", &self.visible)
            .field("parked", &self.parked.len())
            .finish_non_exhaustive()
    }
}

impl RgaDocument {
    /// Empty document owned by `replica`.
    pub fn new(replica: u64, on_update: UpdateCallback) -> Self {
        Self {
            replica,
            clock: LamportClock::new(),
            nodes: Vec::new(),
            known: HashSet::new(),
            visible: 0,
            parked: Vec::new(),
            pending: Vec::new(),
            depth: 0,
            on_update,
        }
    }

    /// Document owned by `replica`, initialized from an encoded state.
    pub fn from_state(
        replica: u64,
        on_update: UpdateCallback,
        state: &[u8],
    ) -> Result<Self, DocError> {
        let state: State = rmp_serde::from_slice(state)?;
        let mut doc = Self::new(replica, on_update);
        for seg in state.segments {
            for (i, ch) in seg.text.chars().enumerate() {
                let id = seg.start.offset(i as u64);
                doc.known.insert(id);
                if !seg.deleted {
                    doc.visible += 1;
                }
                doc.nodes.push(Node {
                    id,
                    ch,
                    deleted: seg.deleted,
                });
            }
        }
        doc.clock.observe(state.clock);
        doc.parked = state.parked;
        Ok(doc)
    }

    /// Replica id stamped on local characters.
    #[must_use]
    pub fn replica(&self) -> u64 {
        self.replica
    }

    /// Number of ops waiting for a missing dependency.
    #[must_use]
    pub fn parked(&self) -> usize {
        self.parked.len()
    }

    fn position(&self, id: OpId) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    /// Array index of the `pos`-th visible character.
    fn visible_index(&self, pos: usize) -> Result<usize, DocError> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.deleted)
            .nth(pos)
            .map(|(i, _)| i)
            .ok_or(DocError::OutOfBounds {
                pos,
                len: self.visible,
            })
    }

    /// Splice a run into place. Returns false when the origin is unknown.
    fn integrate_insert(&mut self, id: OpId, origin: Option<OpId>, text: &str) -> bool {
        let mut idx = match origin {
            None => 0,
            Some(o) => match self.position(o) {
                Some(p) => p + 1,
                None => return false,
            },
        };
        while idx < self.nodes.len() && self.nodes[idx].id > id {
            idx += 1;
        }
        let run: Vec<Node> = text
            .chars()
            .enumerate()
            .map(|(i, ch)| Node {
                id: id.offset(i as u64),
                ch,
                deleted: false,
            })
            .collect();
        let Some(last) = run.last() else {
            return true;
        };
        self.clock.observe(last.id.counter);
        self.known.extend(run.iter().map(|n| n.id));
        self.visible += run.len();
        self.nodes.splice(idx..idx, run);
        true
    }

    fn tombstone(&mut self, id: OpId) -> bool {
        match self.position(id) {
            Some(p) => {
                let node = &mut self.nodes[p];
                if !node.deleted {
                    node.deleted = true;
                    self.visible -= 1;
                }
                true
            }
            None => false,
        }
    }

    /// Apply one remote op. Returns whether anything changed and the part
    /// of the op that still waits for a dependency.
    fn integrate(&mut self, op: Op) -> (bool, Option<Op>) {
        match op {
            Op::Insert { id, origin, text } => {
                if self.known.contains(&id) {
                    (true, None)
                } else if self.integrate_insert(id, origin, &text) {
                    (true, None)
                } else {
                    (false, Some(Op::Insert { id, origin, text }))
                }
            }
            Op::Delete { targets } => {
                let total = targets.len();
                let missing: Vec<OpId> = targets
                    .into_iter()
                    .filter(|t| !self.tombstone(*t))
                    .collect();
                let progressed = missing.len() < total;
                if missing.is_empty() {
                    (true, None)
                } else {
                    (progressed, Some(Op::Delete { targets: missing }))
                }
            }
        }
    }

    fn drain_parked(&mut self) {
        loop {
            let parked = std::mem::take(&mut self.parked);
            let mut progressed = false;
            for op in parked {
                let (changed, rest) = self.integrate(op);
                progressed |= changed;
                if let Some(rest) = rest {
                    self.parked.push(rest);
                }
            }
            if !progressed || self.parked.is_empty() {
                break;
            }
        }
    }

    fn emit(&mut self, op: Op) -> Result<(), DocError> {
        self.pending.push(op);
        if self.depth == 0 {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DocError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let update = Update {
            ops: std::mem::take(&mut self.pending),
        };
        let bytes = rmp_serde::to_vec(&update)?;
        (self.on_update)(&bytes);
        Ok(())
    }
}

impl TextDocument for RgaDocument {
    fn insert_text(&mut self, pos: usize, text: &str) -> Result<(), DocError> {
        if pos > self.visible {
            return Err(DocError::OutOfBounds {
                pos,
                len: self.visible,
            });
        }
        let n = text.chars().count();
        if n == 0 {
            return Ok(());
        }
        let origin = match pos {
            0 => None,
            p => Some(self.nodes[self.visible_index(p - 1)?].id),
        };
        let id = OpId::new(self.clock.reserve(n as u64), self.replica);
        self.integrate_insert(id, origin, text);
        self.emit(Op::Insert {
            id,
            origin,
            text: text.to_owned(),
        })
    }

    fn delete_text(&mut self, pos: usize, len: usize) -> Result<(), DocError> {
        let end = pos.saturating_add(len);
        if end > self.visible {
            return Err(DocError::OutOfBounds {
                pos: end,
                len: self.visible,
            });
        }
        if len == 0 {
            return Ok(());
        }
        let targets: Vec<OpId> = self
            .nodes
            .iter()
            .filter(|n| !n.deleted)
            .skip(pos)
            .take(len)
            .map(|n| n.id)
            .collect();
        for t in &targets {
            self.tombstone(*t);
        }
        self.emit(Op::Delete { targets })
    }

    fn apply_update(&mut self, update: &[u8]) -> Result<(), DocError> {
        let update: Update = rmp_serde::from_slice(update)?;
        for op in update.ops {
            if let (_, Some(rest)) = self.integrate(op) {
                self.parked.push(rest);
            }
        }
        if !self.parked.is_empty() {
            self.drain_parked();
        }
        Ok(())
    }

    fn text(&self) -> String {
        self.nodes
            .iter()
            .filter(|n| !n.deleted)
            .map(|n| n.ch)
            .collect()
    }

    fn len(&self) -> usize {
        self.visible
    }

    fn encode_state(&self) -> Result<Vec<u8>, DocError> {
        let mut segments: Vec<Segment> = Vec::new();
        let mut run_len = 0u64;
        for node in &self.nodes {
            if let Some(seg) = segments.last_mut() {
                if seg.deleted == node.deleted && seg.start.offset(run_len) == node.id {
                    seg.text.push(node.ch);
                    run_len += 1;
                    continue;
                }
            }
            segments.push(Segment {
                start: node.id,
                text: node.ch.to_string(),
                deleted: node.deleted,
            });
            run_len = 1;
        }
        let state = State {
            clock: self.clock.value(),
            segments,
            parked: self.parked.clone(),
        };
        Ok(rmp_serde::to_vec(&state)?)
    }

    fn transact(
        &mut self,
        f: &mut dyn FnMut(&mut dyn TextDocument) -> Result<(), DocError>,
    ) -> Result<(), DocError> {
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        // Edits made before a failure are already integrated locally and
        // must still reach the peers.
        if self.depth == 0 {
            self.flush()?;
        }
        result
    }
}

/// [`DocumentFactory`] for [`RgaDocument`]. Each document gets a random
/// replica id.
#[derive(Debug, Clone, Copy, Default)]
pub struct RgaFactory;

impl DocumentFactory for RgaFactory {
    fn name(&self) -> &'static str {
        "rga"
    }

    fn create(&self, on_update: UpdateCallback) -> Box<dyn TextDocument> {
        Box::new(RgaDocument::new(rand::random(), on_update))
    }

    fn load(
        &self,
        on_update: UpdateCallback,
        state: &[u8],
    ) -> Result<Box<dyn TextDocument>, DocError> {
        Ok(Box::new(RgaDocument::from_state(
            rand::random(),
            on_update,
            state,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Outbox = Arc<Mutex<Vec<Vec<u8>>>>;

    fn recorder() -> (UpdateCallback, Outbox) {
        let outbox: Outbox = Arc::default();
        let sink = Arc::clone(&outbox);
        (
            Box::new(move |u: &[u8]| sink.lock().unwrap().push(u.to_vec())),
            outbox,
        )
    }

    fn silent() -> UpdateCallback {
        Box::new(|_: &[u8]| {})
    }

    #[test]
    fn test_local_edits_emit_one_update_each() {
        let (cb, outbox) = recorder();
        let mut doc = RgaDocument::new(1, cb);
        doc.insert_text(0, "hello").unwrap();
        doc.insert_text(5, " world").unwrap();
        doc.delete_text(0, 1).unwrap();
        assert_eq!(doc.text(), "ello world");
        assert_eq!(doc.len(), 10);
        assert_eq!(outbox.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_transact_batches_into_one_update() {
        let (cb, outbox) = recorder();
        let mut doc = RgaDocument::new(1, cb);
        doc.transact(&mut |d| {
            d.insert_text(0, "abc")?;
            d.insert_text(3, "def")?;
            d.delete_text(1, 1)
        })
        .unwrap();
        assert_eq!(doc.text(), "acdef");
        assert_eq!(outbox.lock().unwrap().len(), 1);

        let mut other = RgaDocument::new(2, silent());
        other.apply_update(&outbox.lock().unwrap()[0]).unwrap();
        assert_eq!(other.text(), "acdef");
    }

    #[test]
    fn test_failed_transact_still_emits_applied_edits() {
        let (cb, outbox) = recorder();
        let mut doc = RgaDocument::new(1, cb);
        let err = doc
            .transact(&mut |d| {
                d.insert_text(0, "ab")?;
                d.insert_text(9, "x")
            })
            .unwrap_err();
        assert!(matches!(err, DocError::OutOfBounds { pos: 9, len: 2 }));
        assert_eq!(doc.text(), "ab");
        assert_eq!(outbox.lock().unwrap().len(), 1);

        let mut other = RgaDocument::new(2, silent());
        other.apply_update(&outbox.lock().unwrap()[0]).unwrap();
        assert_eq!(other.text(), "ab");
    }

    #[test]
    fn test_remote_apply_emits_nothing() {
        let (cb_a, out_a) = recorder();
        let (cb_b, out_b) = recorder();
        let mut a = RgaDocument::new(1, cb_a);
        let mut b = RgaDocument::new(2, cb_b);
        a.insert_text(0, "xy").unwrap();
        b.apply_update(&out_a.lock().unwrap()[0]).unwrap();
        assert!(out_b.lock().unwrap().is_empty());
    }

    #[test]
    fn test_out_of_bounds() {
        let mut doc = RgaDocument::new(1, silent());
        doc.insert_text(0, "ab").unwrap();
        assert!(matches!(
            doc.insert_text(3, "x"),
            Err(DocError::OutOfBounds { pos: 3, len: 2 })
        ));
        assert!(matches!(
            doc.delete_text(1, 2),
            Err(DocError::OutOfBounds { pos: 3, len: 2 })
        ));
    }

    #[test]
    fn test_insert_after_deleted_origin() {
        let (cb, outbox) = recorder();
        let mut a = RgaDocument::new(1, cb);
        let mut b = RgaDocument::new(2, silent());
        a.insert_text(0, "abc").unwrap();
        b.apply_update(&outbox.lock().unwrap()[0]).unwrap();

        // b types after 'b' while a deletes it
        let (cb_b, out_b) = recorder();
        let mut b = RgaDocument::from_state(2, cb_b, &b.encode_state().unwrap()).unwrap();
        b.insert_text(2, "Z").unwrap();
        a.delete_text(1, 1).unwrap();

        a.apply_update(&out_b.lock().unwrap()[0]).unwrap();
        b.apply_update(&outbox.lock().unwrap()[1]).unwrap();
        assert_eq!(a.text(), "aZc");
        assert_eq!(b.text(), "aZc");
    }

    #[test]
    fn test_missing_origin_is_parked_until_resolved() {
        let (cb, outbox) = recorder();
        let mut a = RgaDocument::new(1, cb);
        a.insert_text(0, "ab").unwrap();
        a.insert_text(2, "c").unwrap();
        a.delete_text(0, 1).unwrap();
        let updates = outbox.lock().unwrap().clone();

        let mut b = RgaDocument::new(2, silent());
        b.apply_update(&updates[2]).unwrap();
        b.apply_update(&updates[1]).unwrap();
        assert_eq!(b.text(), "");
        assert_eq!(b.parked(), 2);
        b.apply_update(&updates[0]).unwrap();
        assert_eq!(b.parked(), 0);
        assert_eq!(b.text(), "bc");
    }

    #[test]
    fn test_state_keeps_tombstones_and_clock() {
        let mut a = RgaDocument::new(1, silent());
        a.insert_text(0, "hello").unwrap();
        a.delete_text(1, 3).unwrap();
        let state = a.encode_state().unwrap();

        let (cb, outbox) = recorder();
        let mut b = RgaDocument::from_state(2, cb, &state).unwrap();
        assert_eq!(b.text(), "ho");
        assert_eq!(b.len(), 2);
        b.insert_text(1, "i").unwrap();
        assert_eq!(b.text(), "hio");

        a.apply_update(&outbox.lock().unwrap()[0]).unwrap();
        assert_eq!(a.text(), "hio");
    }

    #[test]
    fn test_garbage_update_is_rejected() {
        let mut doc = RgaDocument::new(1, silent());
        assert!(matches!(
            doc.apply_update(b"\xc1\xc1"),
            Err(DocError::Decode(_))
        ));
    }

    #[test]
    fn test_factory_load() {
        let factory = RgaFactory;
        let mut a = factory.create(silent());
        a.insert_text(0, "seed").unwrap();
        let b = factory.load(silent(), &a.encode_state().unwrap()).unwrap();
        assert_eq!(b.text(), "seed");
        assert_eq!(factory.name(), "rga");
    }
}
