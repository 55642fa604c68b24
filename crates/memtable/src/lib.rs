//! # Memtable
//!
//! The in-memory, sorted write buffer of the UndertowKV storage engine.
//!
//! Every write becomes an [`InternalKey`] record and lands here first. The
//! buffer never overwrites: a newer write for the same user key is inserted
//! *alongside* the older one, and the comparator (user key ascending,
//! sequence descending) guarantees a seek visits the freshest record first.
//! Tombstones are ordinary records with [`ValueType::Deletion`].
//!
//! ## Lifecycle
//!
//! A live memtable accepts inserts until its approximate memory usage
//! crosses the configured write-buffer size. The engine then freezes it into
//! an immutable memtable (shared, read-only) and replaces it with a fresh
//! one; the frozen table is dropped once its contents are durable as a
//! level-0 table file and the version metadata has been updated.
//!
//! ## Concurrency
//!
//! The ordered set sits behind its own reader/writer lock: readers walk a
//! consistent view while the single admitted writer inserts. Memory
//! accounting (`16 + key + value` per insert) is an atomic beside the lock.

mod internal_key;

use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::RwLock;

pub use internal_key::{InternalKey, ValueType};

/// Outcome of a point lookup at any layer of the store.
///
/// `Deleted` is deliberately distinct from `Missing`: a tombstone at one
/// layer must shadow live values below it, so the read path stops at the
/// first decisive answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// A live value for the key.
    Found(Vec<u8>),
    /// The key's most recent record is a tombstone.
    Deleted,
    /// No record for the key at this layer.
    Missing,
}

/// Ordered in-memory buffer of [`InternalKey`] records.
pub struct MemTable {
    table: RwLock<BTreeSet<InternalKey>>,
    memory_usage: AtomicU64,
}

impl MemTable {
    /// Creates an empty memtable.
    pub fn new() -> Self {
        Self {
            table: RwLock::new(BTreeSet::new()),
            memory_usage: AtomicU64::new(0),
        }
    }

    /// Inserts a record. Never overwrites and never fails; older records for
    /// the same user key stay in place behind the new one.
    pub fn add(&self, seq: u64, value_type: ValueType, user_key: &[u8], user_value: &[u8]) {
        let record = InternalKey::new(seq, value_type, user_key, user_value);
        self.memory_usage.fetch_add(
            16 + user_key.len() as u64 + user_value.len() as u64,
            AtomicOrdering::Relaxed,
        );
        self.table.write().insert(record);
    }

    /// Point lookup: seeks to the first record at or after the probe key
    /// `(user_key, seq = MAX, Value)`. If that record carries the probed
    /// user key it is the freshest one by construction of the order.
    pub fn get(&self, user_key: &[u8]) -> Lookup {
        let probe = InternalKey::lookup(user_key);
        let table = self.table.read();
        match table.range(&probe..).next() {
            Some(record) if record.user_key == user_key => match record.value_type {
                ValueType::Value => Lookup::Found(record.user_value.clone()),
                ValueType::Deletion => Lookup::Deleted,
            },
            _ => Lookup::Missing,
        }
    }

    /// Approximate bytes held: `16 + key + value` per insert, node overhead
    /// excluded. Drives the flush decision.
    #[must_use]
    pub fn approximate_memory_usage(&self) -> u64 {
        self.memory_usage.load(AtomicOrdering::Relaxed)
    }

    /// Number of records, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Returns `true` if no record has been inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    /// Ordered cursor over all records; the level-0 flush streams from it.
    pub fn iter(&self) -> MemTableIter<'_> {
        MemTableIter {
            mem: self,
            current: None,
        }
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemTable")
            .field("records", &self.len())
            .field("memory_usage", &self.approximate_memory_usage())
            .finish()
    }
}

/// Cursor over a memtable in comparator order.
///
/// The cursor re-enters the set by key rather than holding a borrow into it,
/// so it takes the read lock only per step and stays valid across concurrent
/// inserts (each `next` resumes strictly after the last yielded record).
pub struct MemTableIter<'a> {
    mem: &'a MemTable,
    current: Option<InternalKey>,
}

impl MemTableIter<'_> {
    /// Positions the cursor on the smallest record, if any.
    pub fn seek_to_first(&mut self) {
        self.current = self.mem.table.read().iter().next().cloned();
    }

    /// Positions the cursor on the first record at or after `probe`.
    pub fn seek(&mut self, probe: &InternalKey) {
        self.current = self.mem.table.read().range(probe..).next().cloned();
    }

    /// Advances past the current record.
    pub fn next(&mut self) {
        if let Some(current) = self.current.take() {
            self.current = self
                .mem
                .table
                .read()
                .range((Bound::Excluded(&current), Bound::Unbounded))
                .next()
                .cloned();
        }
    }

    /// Returns `true` while the cursor is positioned on a record.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    /// The record under the cursor, or `None` once exhausted.
    #[must_use]
    pub fn key(&self) -> Option<&InternalKey> {
        self.current.as_ref()
    }
}
