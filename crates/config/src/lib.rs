//! # Config
//!
//! Tunable policy knobs for the UndertowKV storage engine.
//!
//! Every threshold that shapes write admission, flushing, and compaction
//! lives in [`Options`]. Defaults are production-shaped; tests override them
//! with much smaller values so that flushes and compactions trigger after a
//! handful of writes.

/// Number of levels in the on-disk tree.
///
/// Level 0 holds freshly flushed files (key ranges may overlap); levels 1
/// and up hold disjoint, sorted files produced by compaction. This sizes the
/// per-level arrays in the version metadata and the MANIFEST layout, so it
/// is a compile-time constant rather than an [`Options`] field.
pub const NUM_LEVELS: usize = 7;

/// Engine tuning knobs.
///
/// Construct with [`Options::default`] and override individual fields:
///
/// ```rust
/// use config::Options;
///
/// let opts = Options {
///     write_buffer_size: 4 << 7,
///     ..Options::default()
/// };
/// assert_eq!(opts.l0_compaction_trigger, 4);
/// ```
#[derive(Debug, Clone)]
pub struct Options {
    /// Memtable byte-size threshold that freezes it for a level-0 flush.
    pub write_buffer_size: u64,

    /// Byte-size at which a compaction output file is finalized and a new
    /// one started.
    pub max_file_size: u64,

    /// Base for per-level byte budgets: level 1 holds `10 * base_level_size`
    /// bytes, and each further level multiplies by 10.
    pub base_level_size: u64,

    /// Number of level-0 files at which level 0 becomes the compaction
    /// candidate.
    pub l0_compaction_trigger: usize,

    /// Number of level-0 files at which each write is delayed by 1 ms to let
    /// the background job catch up.
    pub l0_slowdown_writes_trigger: usize,

    /// Highest level a fresh memtable flush may be placed at when it does
    /// not overlap lower levels. `0` pins every flush to level 0.
    pub max_mem_compact_level: usize,

    /// Budget of simultaneously open files for the whole process.
    pub max_open_files: usize,

    /// Portion of `max_open_files` reserved for non-table files (MANIFEST,
    /// CURRENT, scratch); the remainder bounds the table handle cache.
    pub num_non_table_cache_files: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            write_buffer_size: 4 << 20,
            max_file_size: 2 << 20,
            base_level_size: 1 << 20,
            l0_compaction_trigger: 4,
            l0_slowdown_writes_trigger: 8,
            max_mem_compact_level: 0,
            max_open_files: 1000,
            num_non_table_cache_files: 10,
        }
    }
}

impl Options {
    /// Number of table handles the table cache may keep open.
    #[must_use]
    pub fn table_cache_capacity(&self) -> usize {
        self.max_open_files
            .saturating_sub(self.num_non_table_cache_files)
            .max(1)
    }
}
