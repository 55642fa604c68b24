use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use config::Options;
use memtable::{InternalKey, MemTable, ValueType};

use crate::table_cache::TableCache;
use crate::version::{FileMetaData, Version};

/// The experiment-sized knobs the thresholds were designed around: flushes
/// after ~half a KiB, output files of ~128 bytes, tiny level budgets.
pub(crate) fn small_options() -> Options {
    Options {
        write_buffer_size: 4 << 7,
        max_file_size: 2 << 6,
        base_level_size: 2 << 8,
        ..Options::default()
    }
}

/// Empty version rooted at `dir` with its own table cache.
pub(crate) fn empty_version(dir: &Path) -> Version {
    let cache = Arc::new(TableCache::new(dir.to_path_buf(), 100));
    Version::new(dir.to_path_buf(), cache)
}

/// Fabricated file metadata for selection and codec tests; `file_size` is
/// whatever the test's scoring needs.
pub(crate) fn meta(number: u64, smallest: &[u8], largest: &[u8], file_size: u64) -> Arc<FileMetaData> {
    Arc::new(FileMetaData {
        number,
        file_size,
        allow_seeks: 1 << 30,
        smallest: InternalKey::new(1, ValueType::Value, smallest, b""),
        largest: InternalKey::new(1, ValueType::Value, largest, b""),
    })
}

/// Memtable pre-filled with `(seq, key, value)` puts.
pub(crate) fn filled_memtable(entries: &[(u64, &[u8], &[u8])]) -> MemTable {
    let mem = MemTable::new();
    for (seq, key, value) in entries {
        mem.add(*seq, ValueType::Value, key, value);
    }
    mem
}

/// Polls `cond` for up to five seconds; background work is asynchronous.
pub(crate) fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}
