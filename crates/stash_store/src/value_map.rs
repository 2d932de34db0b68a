//! The value store: a sharded concurrent map from [`SyntheticKey`] to the
//! slot stored at that coordinate (counter, interned name, record header, or
//! user field value).
//!
//! Sixteen fixed shards, each behind its own reader/writer lock; the shard is
//! picked by hashing the key bytes. Readers of different keys never block
//! each other, and `load_or_store` is atomic within the owning shard.

use std::collections::hash_map::{DefaultHasher, Entry};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, PoisonError, RwLock};

use crate::key::SyntheticKey;
use crate::record::{FieldValue, RecordHeader};

const SHARD_COUNT: usize = 16;

/// What a synthetic-key coordinate holds.
///
/// The counter variant shares its atomic through an `Arc`, so a cloned slot
/// still observes (and advances) the same per-section id sequence.
#[derive(Clone, Debug)]
pub enum Slot {
    Counter(Arc<AtomicU64>),
    Name(String),
    Header(RecordHeader),
    Field(FieldValue),
}

pub struct ValueMap {
    shards: [RwLock<HashMap<SyntheticKey, Slot>>; SHARD_COUNT],
}

fn shard_for_key(key: &SyntheticKey) -> usize {
    let mut hasher = DefaultHasher::new();
    key.as_bytes().hash(&mut hasher);
    (hasher.finish() as usize) % SHARD_COUNT
}

impl ValueMap {
    pub fn new() -> Self {
        ValueMap {
            shards: std::array::from_fn(|_| RwLock::new(HashMap::new())),
        }
    }

    pub fn load(&self, key: SyntheticKey) -> Option<Slot> {
        self.shards[shard_for_key(&key)]
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    pub fn store(&self, key: SyntheticKey, slot: Slot) {
        self.shards[shard_for_key(&key)]
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, slot);
    }

    /// Return the existing slot (loaded = true), or install `slot` and
    /// report it fresh (loaded = false).
    pub fn load_or_store(&self, key: SyntheticKey, slot: Slot) -> (Slot, bool) {
        let mut shard = self.shards[shard_for_key(&key)]
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match shard.entry(key) {
            Entry::Occupied(entry) => (entry.get().clone(), true),
            Entry::Vacant(entry) => {
                entry.insert(slot.clone());
                (slot, false)
            }
        }
    }

    pub fn delete(&self, key: SyntheticKey) {
        self.shards[shard_for_key(&key)]
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
    }

    /// Unordered range over all entries. The callback returns `false` to
    /// stop the walk early.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&SyntheticKey, &Slot) -> bool,
    {
        for shard in &self.shards {
            let shard = shard.read().unwrap_or_else(PoisonError::into_inner);
            for (key, slot) in shard.iter() {
                if !f(key, slot) {
                    return;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ValueMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    fn key(section: u8, record: u64, field: u16) -> SyntheticKey {
        SyntheticKey::new(section, record, field)
    }

    #[test]
    fn store_load_delete() {
        let map = ValueMap::new();
        let k = key(1, 1, 1);
        assert!(map.load(k).is_none());

        map.store(k, Slot::Field(FieldValue::Int(7)));
        match map.load(k) {
            Some(Slot::Field(FieldValue::Int(7))) => {}
            other => panic!("unexpected slot: {other:?}"),
        }

        map.delete(k);
        assert!(map.load(k).is_none());
        assert!(map.is_empty());
    }

    #[test]
    fn load_or_store_returns_existing() {
        let map = ValueMap::new();
        let k = key(1, 0, 0);

        let (slot, loaded) = map.load_or_store(k, Slot::Counter(Arc::new(AtomicU64::new(1))));
        assert!(!loaded);
        let first = match slot {
            Slot::Counter(c) => c,
            other => panic!("unexpected slot: {other:?}"),
        };

        let (slot, loaded) = map.load_or_store(k, Slot::Counter(Arc::new(AtomicU64::new(99))));
        assert!(loaded);
        match slot {
            Slot::Counter(c) => {
                // Same shared atomic, not the rejected replacement.
                first.fetch_add(1, Ordering::SeqCst);
                assert_eq!(c.load(Ordering::SeqCst), 2);
            }
            other => panic!("unexpected slot: {other:?}"),
        }
    }

    #[test]
    fn for_each_visits_all_and_stops() {
        let map = ValueMap::new();
        for record in 0..32 {
            map.store(key(1, record, 0), Slot::Field(FieldValue::Int(record as i64)));
        }
        assert_eq!(map.len(), 32);

        let mut seen = 0;
        map.for_each(|_, _| {
            seen += 1;
            true
        });
        assert_eq!(seen, 32);

        let mut visited = 0;
        map.for_each(|_, _| {
            visited += 1;
            visited < 5
        });
        assert_eq!(visited, 5);
    }
}
