//! Bounded cache of opened table handles, keyed by file number.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use lru::LruCache;
use memtable::Lookup;
use parking_lot::Mutex;
use sstable::{Table, TableIterator};

use crate::filename;

/// LRU of `file number → Arc<Table>`.
///
/// Handles are opened lazily on first use and shared: lookups and iterators
/// clone the `Arc`, so an eviction only drops the cache's own reference — a
/// live iterator keeps its table open. The map sits behind a mutex; the lock
/// is held for lookup-or-open only, never while a handle is in use.
pub(crate) struct TableCache {
    name: PathBuf,
    cache: Mutex<LruCache<u64, Arc<Table>>>,
}

impl TableCache {
    /// Creates a cache rooted at the database directory, bounded to
    /// `capacity` open tables.
    pub(crate) fn new(name: PathBuf, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Point lookup in the table with the given file number.
    pub(crate) fn get(&self, number: u64, user_key: &[u8]) -> Result<Lookup> {
        self.find_table(number)?.get(user_key)
    }

    /// Ordered iterator over the table with the given file number. The
    /// iterator owns its handle and outlives any eviction.
    pub(crate) fn new_iterator(&self, number: u64) -> Result<TableIterator> {
        Ok(self.find_table(number)?.new_iterator())
    }

    fn find_table(&self, number: u64) -> Result<Arc<Table>> {
        let mut cache = self.cache.lock();
        if let Some(table) = cache.get(&number) {
            return Ok(Arc::clone(table));
        }
        let path = filename::table_file_name(&self.name, number);
        let table = Arc::new(
            Table::open(&path).with_context(|| format!("opening table file {}", path.display()))?,
        );
        cache.put(number, Arc::clone(&table));
        Ok(table)
    }
}

impl std::fmt::Debug for TableCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableCache")
            .field("name", &self.name)
            .field("open_tables", &self.cache.lock().len())
            .finish()
    }
}
