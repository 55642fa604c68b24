//! K-way merge over any set of [`InternalIterator`]s.
//!
//! This is the engine of compaction: every input file contributes one
//! sub-iterator, and the merge yields the union of their records in
//! comparator order. Nothing is deduplicated here — for a user key written
//! several times, the comparator's seq-descending rule makes the freshest
//! record come out first, and the compaction loop drops the rest.

use anyhow::Result;
use memtable::InternalKey;

use crate::iter::InternalIterator;

/// Merges records from a list of sub-iterators in comparator order.
///
/// Ties (identical internal keys across inputs) resolve to the earliest
/// sub-iterator in the list. Callers list newer-level inputs first, so the
/// fresher copy of a record wins the tie — the same freshness rule the rest
/// of the store relies on.
pub struct MergingIterator {
    children: Vec<Box<dyn InternalIterator>>,
    /// Index of the child currently holding the smallest record.
    current: Option<usize>,
}

impl MergingIterator {
    pub fn new(children: Vec<Box<dyn InternalIterator>>) -> Self {
        Self {
            children,
            current: None,
        }
    }

    /// Seeks every child to its first record and selects the smallest.
    pub fn seek_to_first(&mut self) {
        for child in &mut self.children {
            child.seek_to_first();
        }
        self.find_smallest();
    }

    /// Returns `true` while positioned on a record.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.internal_key().is_some()
    }

    /// The smallest record across all children, or `None` when exhausted.
    #[must_use]
    pub fn internal_key(&self) -> Option<&InternalKey> {
        self.current
            .and_then(|i| self.children[i].internal_key())
    }

    /// Advances the child that produced the current record, then re-selects
    /// the smallest.
    pub fn next(&mut self) {
        if let Some(i) = self.current {
            self.children[i].next();
        }
        self.find_smallest();
    }

    /// Takes the first latched error from any child.
    pub fn status(&mut self) -> Result<()> {
        for child in &mut self.children {
            child.status()?;
        }
        Ok(())
    }

    fn find_smallest(&mut self) {
        let mut smallest: Option<usize> = None;
        for (i, child) in self.children.iter().enumerate() {
            let Some(key) = child.internal_key() else {
                continue;
            };
            let replace = match smallest.and_then(|s| self.children[s].internal_key()) {
                // Strictly smaller only: on a tie the earlier child keeps
                // the slot.
                Some(best) => key < best,
                None => true,
            };
            if replace {
                smallest = Some(i);
            }
        }
        self.current = smallest;
    }
}
