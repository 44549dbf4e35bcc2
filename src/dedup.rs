//! First-seen-wins registry of received updates.

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Result of offering an update to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First time this id was seen; the bytes were stored.
    Accepted,
    /// The id was already registered; nothing changed.
    Duplicate,
}

/// Set of update ids received during one scenario, with the bytes that
/// arrived first for each.
///
/// Admission is atomic per id, so several receive paths may share one
/// registry.
#[derive(Debug, Default)]
pub struct DedupRegistry {
    seen: DashMap<u64, Bytes>,
}

impl DedupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `update` under `id` unless the id is already known.
    pub fn admit(&self, id: u64, update: Bytes) -> Admission {
        match self.seen.entry(id) {
            Entry::Occupied(_) => Admission::Duplicate,
            Entry::Vacant(slot) => {
                slot.insert(update);
                Admission::Accepted
            }
        }
    }

    pub fn contains(&self, id: u64) -> bool {
        self.seen.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// All admitted updates, ids ascending.
    pub fn sorted(&self) -> Vec<(u64, Bytes)> {
        let mut all: Vec<(u64, Bytes)> = self
            .seen
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        all.sort_unstable_by_key(|(id, _)| *id);
        all
    }
}
