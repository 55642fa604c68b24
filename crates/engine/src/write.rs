//! Write path: `put()`, `delete()`, and the admission loop.
//!
//! Every mutation is admitted under the engine lock — which issues its
//! sequence number and may stall the writer — and then inserted into the
//! memtable with the lock released; the memtable's own lock serializes the
//! insert against concurrent readers.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, ensure, Result};
use memtable::{MemTable, ValueType};

use crate::bgwork;
use crate::{Db, MAX_KEY_SIZE, MAX_VALUE_SIZE};

impl Db {
    /// Inserts a key-value pair.
    pub fn put(&self, user_key: &[u8], user_value: &[u8]) -> Result<()> {
        ensure!(!user_key.is_empty(), "key must not be empty");
        ensure!(
            user_key.len() <= MAX_KEY_SIZE,
            "key too large: {} bytes (max {})",
            user_key.len(),
            MAX_KEY_SIZE
        );
        ensure!(
            user_value.len() <= MAX_VALUE_SIZE,
            "value too large: {} bytes (max {})",
            user_value.len(),
            MAX_VALUE_SIZE
        );

        let (seq, mem) = self.make_room_for_write()?;
        mem.add(seq, ValueType::Value, user_key, user_value);
        Ok(())
    }

    /// Deletes a key by writing a tombstone. The tombstone shadows any older
    /// value in the file hierarchy until compaction reconciles them.
    pub fn delete(&self, user_key: &[u8]) -> Result<()> {
        ensure!(!user_key.is_empty(), "key must not be empty");
        ensure!(
            user_key.len() <= MAX_KEY_SIZE,
            "key too large: {} bytes (max {})",
            user_key.len(),
            MAX_KEY_SIZE
        );

        let (seq, mem) = self.make_room_for_write()?;
        mem.add(seq, ValueType::Deletion, user_key, b"");
        Ok(())
    }

    /// Admission loop. Returns the issued sequence number and the memtable
    /// the write was admitted into.
    ///
    /// Under the engine lock, in priority order:
    /// - a latched background error fails the write immediately;
    /// - a hot level 0 (at or past the slowdown trigger) releases the lock
    ///   and sleeps 1 ms, then re-evaluates — backpressure that lets the
    ///   background job catch up;
    /// - a memtable within budget admits the write;
    /// - a frozen memtable still flushing parks the writer on the condition
    ///   variable;
    /// - otherwise the full memtable is promoted to `imm`, a fresh one
    ///   installed, the background job scheduled, and the loop re-runs.
    fn make_room_for_write(&self) -> Result<(u64, Arc<MemTable>)> {
        let mut state = self.inner.state.lock();
        loop {
            if let Some(err) = &state.bg_error {
                bail!("background compaction failed: {:#}", err);
            }
            if state.current.num_level_files(0) >= self.inner.options.l0_slowdown_writes_trigger {
                drop(state);
                thread::sleep(Duration::from_millis(1));
                state = self.inner.state.lock();
            } else if state.mem.approximate_memory_usage() <= self.inner.options.write_buffer_size
            {
                return Ok((state.current.next_seq(), Arc::clone(&state.mem)));
            } else if state.imm.is_some() {
                self.inner.background_work_finished.wait(&mut state);
            } else {
                let full = std::mem::replace(&mut state.mem, Arc::new(MemTable::new()));
                state.imm = Some(full);
                bgwork::maybe_schedule_compaction(&self.inner, &mut state);
            }
        }
    }
}
