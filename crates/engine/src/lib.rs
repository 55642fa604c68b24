//! # Engine - UndertowKV Storage Engine
//!
//! An embedded, ordered key-value store organized as a log-structured merge
//! tree, tying the [`memtable`] and [`sstable`] crates together with
//! versioned file metadata and a background compaction scheduler.
//!
//! ## Architecture
//!
//! ```text
//! Client threads
//!   |
//!   v
//! ┌─────────────────────────────────────────────────┐
//! │                      DB                         │
//! │                                                 │
//! │ write.rs → admission loop → memtable insert     │
//! │              |                                  │
//! │              |  (write buffer full?)            │
//! │              v            yes                   │
//! │        mem → imm, schedule background job       │
//! │              |                                  │
//! │ bgwork.rs    v                                  │
//! │        flush imm → L0 file                      │
//! │        while a level is over budget: compact    │
//! │        save MANIFEST, swap CURRENT              │
//! │        install new version                      │
//! │                                                 │
//! │ read.rs → mem → imm → L0..L6 (first match wins) │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module          | Purpose                                             |
//! |-----------------|-----------------------------------------------------|
//! | `lib.rs`        | `Db` handle, open/recovery, accessors, `Drop`       |
//! | `write.rs`      | `put()`, `delete()`, the write admission loop       |
//! | `read.rs`       | `get()` fusing mem / imm / file hierarchy           |
//! | `version.rs`    | `Version` + `FileMetaData`, MANIFEST codec          |
//! | `compaction.rs` | victim selection, L0 flush, merge execution         |
//! | `table_cache.rs`| LRU of open table handles                           |
//! | `bgwork.rs`     | background job, CURRENT swap                        |
//! | `filename.rs`   | on-disk naming                                      |
//!
//! ## Concurrency
//!
//! One mutex guards the mutable engine state (`mem`, `imm`, the current
//! version, the scheduler flag); a condition variable signals background-job
//! completion. Writers are serialized at the sequence-number level inside
//! the admission loop but insert into the memtable outside the lock — the
//! memtable's own reader/writer lock covers that. Readers snapshot `mem`,
//! `imm` and the current version under the lock, release it, and probe the
//! snapshots. The background job owns a private deep copy of the version
//! and publishes it by swapping an `Arc` under the lock, so the heavy work
//! (flush, merges, MANIFEST write) runs with the lock released.
//!
//! ## Durability
//!
//! There is no write-ahead log: writes are durable once their memtable has
//! been flushed to a level-0 file and the MANIFEST/CURRENT pair updated,
//! which [`Db::close`] (and `Drop`) force for a clean shutdown. Table files
//! and the MANIFEST are written to temp names and renamed into place;
//! CURRENT is swapped the same way, so a crash never leaves a torn pointer.

mod bgwork;
mod compaction;
mod filename;
mod read;
mod table_cache;
mod version;
mod write;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::{Condvar, Mutex};

pub use config::{Options, NUM_LEVELS};
pub use memtable::Lookup;

use memtable::MemTable;
use table_cache::TableCache;
use version::Version;

/// Maximum allowed key size in bytes (64 KiB).
pub const MAX_KEY_SIZE: usize = 64 * 1024;
/// Maximum allowed value size in bytes (10 MiB).
pub const MAX_VALUE_SIZE: usize = 10 * 1024 * 1024;

/// An open database.
///
/// The handle is cheap to share across threads behind an `Arc`; every
/// method takes `&self`. Dropping the last handle flushes and waits for
/// background quiescence (see [`close`](Db::close)).
pub struct Db {
    inner: Arc<DbInner>,
}

pub(crate) struct DbInner {
    pub(crate) name: PathBuf,
    pub(crate) options: Options,
    pub(crate) state: Mutex<DbState>,
    /// Signaled whenever a background job finishes, successfully or not.
    pub(crate) background_work_finished: Condvar,
}

pub(crate) struct DbState {
    /// Live memtable receiving writes.
    pub(crate) mem: Arc<MemTable>,
    /// Frozen memtable awaiting its level-0 flush, if any.
    pub(crate) imm: Option<Arc<MemTable>>,
    /// The published version; readers clone the `Arc` and never block.
    pub(crate) current: Arc<Version>,
    /// At most one background job runs at a time.
    pub(crate) bg_compaction_scheduled: bool,
    /// First background failure, latched; subsequent writes observe it.
    pub(crate) bg_error: Option<Arc<anyhow::Error>>,
}

impl Db {
    /// Opens (or creates) the database rooted at `name`.
    ///
    /// Recovery reads `CURRENT` for the active MANIFEST number and decodes
    /// that version; a missing or unreadable `CURRENT` means a fresh
    /// database and an empty version. A present `CURRENT` pointing at an
    /// unreadable MANIFEST is an error, not silent data loss.
    pub fn open<P: AsRef<Path>>(name: P, options: Options) -> Result<Db> {
        let name = name.as_ref().to_path_buf();
        std::fs::create_dir_all(&name)
            .with_context(|| format!("creating database directory {}", name.display()))?;

        let table_cache = Arc::new(TableCache::new(
            name.clone(),
            options.table_cache_capacity(),
        ));
        let current = match bgwork::read_current_file(&name) {
            Some(number) => Version::load(name.clone(), table_cache, number)?,
            None => Version::new(name.clone(), table_cache),
        };

        Ok(Db {
            inner: Arc::new(DbInner {
                name,
                options,
                state: Mutex::new(DbState {
                    mem: Arc::new(MemTable::new()),
                    imm: None,
                    current: Arc::new(current),
                    bg_compaction_scheduled: false,
                    bg_error: None,
                }),
                background_work_finished: Condvar::new(),
            }),
        })
    }

    /// Flushes buffered writes and waits for background quiescence.
    ///
    /// Repeatedly promotes a non-empty memtable and schedules the flush
    /// until nothing is buffered and no job is running. Stops early if a
    /// background job has failed — the remaining buffered writes cannot be
    /// made durable in that case.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        loop {
            if state.bg_compaction_scheduled {
                self.inner.background_work_finished.wait(&mut state);
            } else if state.bg_error.is_some() {
                break;
            } else if state.imm.is_some() || !state.mem.is_empty() {
                if state.imm.is_none() {
                    let full = std::mem::replace(&mut state.mem, Arc::new(MemTable::new()));
                    state.imm = Some(full);
                }
                bgwork::maybe_schedule_compaction(&self.inner, &mut state);
            } else {
                break;
            }
        }
    }

    /// Number of table files at `level` in the current version.
    #[must_use]
    pub fn num_level_files(&self, level: usize) -> usize {
        self.inner.state.lock().current.num_level_files(level)
    }

    /// Approximate bytes buffered in the live memtable.
    #[must_use]
    pub fn memtable_usage(&self) -> u64 {
        self.inner.state.lock().mem.approximate_memory_usage()
    }

    /// Last issued sequence number.
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.inner.state.lock().current.last_seq()
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        let counts: Vec<usize> = (0..NUM_LEVELS)
            .map(|level| state.current.num_level_files(level))
            .collect();
        f.debug_struct("Db")
            .field("name", &self.inner.name)
            .field("memtable_usage", &state.mem.approximate_memory_usage())
            .field("imm_pending", &state.imm.is_some())
            .field("files_per_level", &counts)
            .field("bg_scheduled", &state.bg_compaction_scheduled)
            .finish()
    }
}

/// Clean shutdown on drop: flush what is buffered and wait for the
/// background job. Failures stay latched in the state and are lost with it;
/// callers that care should invoke [`Db::close`] and check their last write
/// explicitly.
impl Drop for Db {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests;
