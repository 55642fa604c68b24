//! Read path: `get()`.

use std::sync::Arc;

use anyhow::Result;
use memtable::Lookup;

use crate::Db;

impl Db {
    /// Point lookup.
    ///
    /// Snapshots the live memtable, the frozen memtable and the current
    /// version under the engine lock, then probes them in freshness order
    /// with the lock released. The first decisive answer wins —
    /// [`Lookup::Deleted`] is decisive, which is how a tombstone in a fresh
    /// layer shadows an older live value below it. [`Lookup::Missing`] is
    /// returned only when every layer misses.
    pub fn get(&self, user_key: &[u8]) -> Result<Lookup> {
        let (mem, imm, current) = {
            let state = self.inner.state.lock();
            (
                Arc::clone(&state.mem),
                state.imm.clone(),
                Arc::clone(&state.current),
            )
        };

        match mem.get(user_key) {
            Lookup::Missing => {}
            decisive => return Ok(decisive),
        }
        if let Some(imm) = imm {
            match imm.get(user_key) {
                Lookup::Missing => {}
                decisive => return Ok(decisive),
            }
        }
        current.get(user_key)
    }
}
