//! Versioned metadata: which table files make up the database right now.
//!
//! A [`Version`] is a snapshot of the whole file hierarchy — per-level file
//! lists, the next file number, and the last issued sequence number. Readers
//! always work against an `Arc<Version>` taken under the engine lock and
//! never see it change; the background job edits a deep copy of the level
//! spine and publishes it by swapping the `Arc`. The [`FileMetaData`]
//! entries themselves are immutable after creation and shared between
//! versions via `Arc`.
//!
//! Level invariants:
//! - Level 0 files may overlap arbitrarily; the list is in flush order and
//!   the newest file has the largest number.
//! - At level 1 and up, files are disjoint in user-key range and sorted
//!   ascending by smallest key, so membership is a binary search.
//!
//! A version persists as a `MANIFEST-<n>` file (see [`Version::save`]); the
//! `CURRENT` file names the manifest that is authoritative.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use config::NUM_LEVELS;
use log::debug;
use memtable::{InternalKey, Lookup};

use crate::filename;
use crate::table_cache::TableCache;

/// Metadata of one immutable table file.
///
/// `number` is the file's identity for its whole life; `smallest` and
/// `largest` bound every user key inside it (payloads stripped). Shared
/// between version snapshots behind an `Arc` and never mutated.
#[derive(Debug, Clone)]
pub(crate) struct FileMetaData {
    pub number: u64,
    pub file_size: u64,
    /// Budget for a future seek-driven compaction trigger; carried in the
    /// manifest but never decremented.
    pub allow_seeks: u64,
    pub smallest: InternalKey,
    pub largest: InternalKey,
}

impl FileMetaData {
    /// Wire form: `allow_seeks (u64) | file_size (u64) | number (u64) |
    /// smallest | largest`, keys in their own packed encoding.
    pub(crate) fn encode_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u64::<LittleEndian>(self.allow_seeks)?;
        w.write_u64::<LittleEndian>(self.file_size)?;
        w.write_u64::<LittleEndian>(self.number)?;
        self.smallest.encode_to(w)?;
        self.largest.encode_to(w)?;
        Ok(())
    }

    pub(crate) fn decode_from<R: Read>(r: &mut R) -> Result<Self> {
        let allow_seeks = r.read_u64::<LittleEndian>()?;
        let file_size = r.read_u64::<LittleEndian>()?;
        let number = r.read_u64::<LittleEndian>()?;
        let smallest = InternalKey::decode_from(r)?;
        let largest = InternalKey::decode_from(r)?;
        Ok(Self {
            number,
            file_size,
            allow_seeks,
            smallest,
            largest,
        })
    }
}

/// Snapshot of the database's file hierarchy plus its two counters.
pub(crate) struct Version {
    name: PathBuf,
    pub(crate) table_cache: Arc<TableCache>,
    /// Next unused file number; every new table file and manifest consumes
    /// one.
    next_file_number: AtomicU64,
    /// Last issued sequence number.
    seq: AtomicU64,
    pub(crate) files: [Vec<Arc<FileMetaData>>; NUM_LEVELS],
    /// Per-level key after which the next compaction at that level starts.
    pub(crate) compact_pointer: [Option<InternalKey>; NUM_LEVELS],
}

impl Version {
    /// Fresh, empty version: file numbering starts at 1, no writes issued.
    pub(crate) fn new(name: PathBuf, table_cache: Arc<TableCache>) -> Self {
        Self {
            name,
            table_cache,
            next_file_number: AtomicU64::new(1),
            seq: AtomicU64::new(0),
            files: Default::default(),
            compact_pointer: Default::default(),
        }
    }

    /// Loads the version persisted as `MANIFEST-<number>`.
    pub(crate) fn load(name: PathBuf, table_cache: Arc<TableCache>, number: u64) -> Result<Self> {
        let path = filename::descriptor_file_name(&name, number);
        let file = File::open(&path)
            .with_context(|| format!("opening manifest {}", path.display()))?;
        let mut version = Self::new(name, table_cache);
        version.decode_from(&mut BufReader::new(file))?;
        Ok(version)
    }

    /// Persists this version as a new manifest, consuming one file number
    /// for it, and returns that number (the caller points CURRENT at it).
    pub(crate) fn save(&self) -> Result<u64> {
        let number = self.new_file_number();
        let path = filename::descriptor_file_name(&self.name, number);
        let file = File::create(&path)
            .with_context(|| format!("creating manifest {}", path.display()))?;
        let mut w = BufWriter::new(file);
        self.encode_to(&mut w)?;
        w.flush()?;
        w.into_inner()?.sync_all()?;
        Ok(number)
    }

    /// Deep-copies the level spine; the `FileMetaData` entries are shared.
    pub(crate) fn copy(&self) -> Self {
        Self {
            name: self.name.clone(),
            table_cache: Arc::clone(&self.table_cache),
            next_file_number: AtomicU64::new(self.next_file_number.load(AtomicOrdering::SeqCst)),
            seq: AtomicU64::new(self.seq.load(AtomicOrdering::SeqCst)),
            files: self.files.clone(),
            compact_pointer: self.compact_pointer.clone(),
        }
    }

    /// Database directory this version belongs to.
    pub(crate) fn name(&self) -> &Path {
        &self.name
    }

    /// Issues the next sequence number. Called under the engine lock.
    pub(crate) fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, AtomicOrdering::SeqCst) + 1
    }

    /// Last issued sequence number.
    pub(crate) fn last_seq(&self) -> u64 {
        self.seq.load(AtomicOrdering::SeqCst)
    }

    /// Fast-forwards the sequence counter; used when a freshly compacted
    /// version is installed while writers kept issuing sequences against the
    /// old one.
    pub(crate) fn set_last_seq(&self, seq: u64) {
        self.seq.store(seq, AtomicOrdering::SeqCst);
    }

    /// Consumes and returns a file number.
    pub(crate) fn new_file_number(&self) -> u64 {
        self.next_file_number.fetch_add(1, AtomicOrdering::SeqCst)
    }

    pub(crate) fn num_level_files(&self, level: usize) -> usize {
        self.files[level].len()
    }

    /// Point lookup across the file hierarchy.
    ///
    /// Levels are searched top down and the first decisive answer wins: a
    /// record at level L is strictly fresher than any record for the same
    /// key at L+1, so lower levels are irrelevant once anything is found —
    /// tombstones included. At level 0 every overlapping file is probed
    /// newest-first; at deeper levels the disjointness invariant narrows the
    /// probe to a single file found by binary search.
    pub(crate) fn get(&self, user_key: &[u8]) -> Result<Lookup> {
        for level in 0..NUM_LEVELS {
            let files = &self.files[level];
            if files.is_empty() {
                continue;
            }

            let candidates: Vec<Arc<FileMetaData>> = if level == 0 {
                let mut overlapping: Vec<Arc<FileMetaData>> = files
                    .iter()
                    .filter(|f| {
                        f.smallest.user_key.as_slice() <= user_key
                            && user_key <= f.largest.user_key.as_slice()
                    })
                    .cloned()
                    .collect();
                overlapping.sort_by(|a, b| b.number.cmp(&a.number));
                overlapping
            } else {
                let slot = find_file(files, user_key);
                match files.get(slot) {
                    Some(f) if f.smallest.user_key.as_slice() <= user_key => {
                        vec![Arc::clone(f)]
                    }
                    _ => Vec::new(),
                }
            };

            for file in candidates {
                match self.table_cache.get(file.number, user_key)? {
                    Lookup::Missing => continue,
                    decisive => return Ok(decisive),
                }
            }
        }
        Ok(Lookup::Missing)
    }

    /// Records a new file at `level`, keeping levels ≥ 1 sorted by smallest
    /// key. Level 0 appends (flush order).
    pub(crate) fn add_file(&mut self, level: usize, meta: Arc<FileMetaData>) {
        debug!(
            "add file: level {} number {:06} range [{}..{}]",
            level,
            meta.number,
            String::from_utf8_lossy(&meta.smallest.user_key),
            String::from_utf8_lossy(&meta.largest.user_key),
        );
        if level == 0 {
            self.files[0].push(meta);
        } else {
            let slot = find_file(&self.files[level], &meta.smallest.user_key);
            self.files[level].insert(slot, meta);
        }
    }

    /// Drops the file with the given number from `level`, if present.
    pub(crate) fn delete_file(&mut self, level: usize, number: u64) {
        if let Some(slot) = self.files[level].iter().position(|f| f.number == number) {
            self.files[level].remove(slot);
            debug!("delete file: level {} number {:06}", level, number);
        }
    }

    /// Wire form: `next_file_number (u64) | seq (u64)`, then per level a
    /// file count (`i32`) followed by that many [`FileMetaData`] records.
    pub(crate) fn encode_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u64::<LittleEndian>(self.next_file_number.load(AtomicOrdering::SeqCst))?;
        w.write_u64::<LittleEndian>(self.seq.load(AtomicOrdering::SeqCst))?;
        for level in 0..NUM_LEVELS {
            w.write_i32::<LittleEndian>(self.files[level].len() as i32)?;
            for meta in &self.files[level] {
                meta.encode_to(w)?;
            }
        }
        Ok(())
    }

    /// Inverse of [`encode_to`](Self::encode_to); level lists are persisted
    /// in their in-memory order, so no re-sorting is needed.
    pub(crate) fn decode_from<R: Read>(&mut self, r: &mut R) -> Result<()> {
        self.next_file_number
            .store(r.read_u64::<LittleEndian>()?, AtomicOrdering::SeqCst);
        self.seq
            .store(r.read_u64::<LittleEndian>()?, AtomicOrdering::SeqCst);
        for level in 0..NUM_LEVELS {
            let num_files = r.read_i32::<LittleEndian>()?;
            ensure!(num_files >= 0, "negative file count at level {}", level);
            let mut files = Vec::with_capacity(num_files as usize);
            for _ in 0..num_files {
                files.push(Arc::new(FileMetaData::decode_from(r)?));
            }
            self.files[level] = files;
        }
        Ok(())
    }

    /// One debug line per populated level.
    pub(crate) fn log_levels(&self) {
        for level in 0..NUM_LEVELS {
            if self.files[level].is_empty() {
                continue;
            }
            let numbers: Vec<String> = self.files[level]
                .iter()
                .map(|f| format!("{:06}", f.number))
                .collect();
            debug!("level {}: {}", level, numbers.join(" "));
        }
    }
}

impl std::fmt::Debug for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: Vec<usize> = self.files.iter().map(Vec::len).collect();
        f.debug_struct("Version")
            .field("next_file_number", &self.next_file_number)
            .field("seq", &self.seq)
            .field("files_per_level", &counts)
            .finish()
    }
}

/// Index of the first file whose largest key is at or after `user_key`;
/// `files.len()` when every file ends before it. Valid only for the sorted,
/// disjoint lists of levels ≥ 1.
pub(crate) fn find_file(files: &[Arc<FileMetaData>], user_key: &[u8]) -> usize {
    let mut left = 0usize;
    let mut right = files.len();
    while left < right {
        let mid = (left + right) / 2;
        if files[mid].largest.user_key.as_slice() < user_key {
            left = mid + 1;
        } else {
            right = mid;
        }
    }
    right
}
