//! Compaction: victim selection and execution.
//!
//! Selection scores every level — level 0 by file count against its
//! trigger, deeper levels by total bytes against a 10×-per-level budget —
//! and compacts the worst offender if its score exceeds 1.0. Execution is
//! either a trivial move (one input file, nothing overlapping below: pure
//! metadata) or a k-way merge of the input files into fresh files at the
//! next level, dropping all but the freshest record per user key and
//! rotating outputs at the configured file size.

use std::cmp::Ordering;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use config::{Options, NUM_LEVELS};
use log::info;
use memtable::{InternalKey, MemTable};
use sstable::{InternalIterator, MergingIterator, TableBuilder};

use crate::filename;
use crate::version::{find_file, FileMetaData, Version};

/// Seek budget assigned to every new file (1 GiB); reserved for a future
/// seek-driven trigger.
const RESERVED_SEEKS: u64 = 1 << 30;

/// A picked compaction: the victim level and its two input sets —
/// `inputs[0]` from `level`, `inputs[1]` the overlapping files at
/// `level + 1`.
pub(crate) struct Compaction {
    level: usize,
    inputs: [Vec<Arc<FileMetaData>>; 2],
}

impl Compaction {
    /// A single input file with nothing overlapping below can be relocated
    /// without rewriting a byte.
    fn is_trivial_move(&self) -> bool {
        self.inputs[0].len() == 1 && self.inputs[1].is_empty()
    }

    fn log(&self) {
        let list = |files: &[Arc<FileMetaData>]| {
            files
                .iter()
                .map(|f| format!("{:06}", f.number))
                .collect::<Vec<_>>()
                .join(" ")
        };
        info!(
            "compacting level {}: inputs[0] = [{}], inputs[1] = [{}]",
            self.level,
            list(&self.inputs[0]),
            list(&self.inputs[1]),
        );
    }
}

/// A compaction output file being built, finalized into its metadata.
struct PendingOutput {
    builder: TableBuilder,
    number: u64,
    smallest: InternalKey,
    largest: InternalKey,
}

impl PendingOutput {
    fn finish(self) -> Result<Arc<FileMetaData>> {
        let file_size = self.builder.finish()?;
        Ok(Arc::new(FileMetaData {
            number: self.number,
            file_size,
            allow_seeks: RESERVED_SEEKS,
            smallest: self.smallest,
            largest: self.largest,
        }))
    }
}

impl Version {
    /// Streams a frozen memtable into a new level-0 table file and records
    /// it in this version.
    ///
    /// An empty memtable produces nothing — no file number is consumed and
    /// no file is added. The target level starts at 0 and may advance while
    /// the new file overlaps nothing there, bounded by
    /// `max_mem_compact_level` (0 in the default policy, pinning flushes to
    /// level 0).
    pub(crate) fn write_level0_table(&mut self, imm: &MemTable, options: &Options) -> Result<()> {
        if imm.is_empty() {
            return Ok(());
        }

        let number = self.new_file_number();
        let mut builder = TableBuilder::new(filename::table_file_name(self.name(), number))?;

        let mut smallest: Option<InternalKey> = None;
        let mut largest: Option<InternalKey> = None;
        let mut iter = imm.iter();
        iter.seek_to_first();
        while let Some(key) = iter.key() {
            if smallest.is_none() {
                smallest = Some(key.without_value());
            }
            largest = Some(key.without_value());
            builder.add(key)?;
            iter.next();
        }
        let file_size = builder.finish()?;

        let smallest = smallest.context("flush emitted no records")?;
        let largest = largest.context("flush emitted no records")?;
        let meta = Arc::new(FileMetaData {
            number,
            file_size,
            allow_seeks: RESERVED_SEEKS,
            smallest,
            largest,
        });

        let mut level = 0;
        if !self.overlap_in_level(0, &meta.smallest.user_key, &meta.largest.user_key) {
            while level < options.max_mem_compact_level
                && !self.overlap_in_level(level + 1, &meta.smallest.user_key, &meta.largest.user_key)
            {
                level += 1;
            }
        }

        info!(
            "flushed memtable to table {:06} at level {} ({} bytes)",
            number, level, file_size
        );
        self.add_file(level, meta);
        Ok(())
    }

    /// Picks and executes one compaction. Returns `false` when no level
    /// scores above 1.0 — the background loop's termination condition.
    pub(crate) fn do_compaction_work(&mut self, options: &Options) -> Result<bool> {
        let Some(compaction) = self.pick_compaction(options) else {
            return Ok(false);
        };
        compaction.log();

        if compaction.is_trivial_move() {
            let file = Arc::clone(&compaction.inputs[0][0]);
            self.delete_file(compaction.level, file.number);
            self.add_file(compaction.level + 1, file);
            return Ok(true);
        }

        // Advance the cursor so the next round at this level starts past
        // the files consumed now.
        if compaction.level > 0 {
            if let Some(last) = compaction.inputs[0].last() {
                self.compact_pointer[compaction.level] = Some(last.largest.clone());
            }
        }

        let mut iter = self.make_input_iterator(&compaction)?;
        iter.seek_to_first();

        let mut outputs: Vec<Arc<FileMetaData>> = Vec::new();
        let mut output: Option<PendingOutput> = None;
        let mut last_user_key: Option<Vec<u8>> = None;

        while let Some(key) = iter.internal_key().cloned() {
            if let Some(prev) = last_user_key.as_deref() {
                match key.user_key.as_slice().cmp(prev) {
                    // The merge yields the freshest record for a key first;
                    // everything after it under the same key is shadowed.
                    Ordering::Equal => {
                        iter.next();
                        continue;
                    }
                    Ordering::Less => bail!(
                        "corrupt merge: key {:?} emitted after {:?}",
                        String::from_utf8_lossy(&key.user_key),
                        String::from_utf8_lossy(prev),
                    ),
                    Ordering::Greater => {}
                }
            }
            last_user_key = Some(key.user_key.clone());

            if output.is_none() {
                let number = self.new_file_number();
                output = Some(PendingOutput {
                    builder: TableBuilder::new(filename::table_file_name(self.name(), number))?,
                    number,
                    smallest: key.without_value(),
                    largest: key.without_value(),
                });
            }
            let mut rotate = false;
            if let Some(out) = output.as_mut() {
                out.builder.add(&key)?;
                out.largest = key.without_value();
                rotate = out.builder.file_size() > options.max_file_size;
            }
            if rotate {
                if let Some(full) = output.take() {
                    outputs.push(full.finish()?);
                }
            }
            iter.next();
        }
        iter.status()?;

        if let Some(out) = output.take() {
            outputs.push(out.finish()?);
        }

        for file in &compaction.inputs[0] {
            self.delete_file(compaction.level, file.number);
        }
        for file in &compaction.inputs[1] {
            self.delete_file(compaction.level + 1, file.number);
        }
        for meta in outputs {
            self.add_file(compaction.level + 1, meta);
        }
        Ok(true)
    }

    /// Chooses the victim level and assembles both input sets, or `None`
    /// when every level is within budget.
    pub(crate) fn pick_compaction(&self, options: &Options) -> Option<Compaction> {
        let level = self.pick_compaction_level(options)?;
        let mut inputs: [Vec<Arc<FileMetaData>>; 2] = [Vec::new(), Vec::new()];

        let (smallest, largest);
        if level == 0 {
            // Level-0 files overlap unpredictably, so all of them go, and
            // the union of their ranges selects the level-1 overlap set.
            inputs[0] = self.files[0].clone();
            let mut small = inputs[0].first()?.smallest.clone();
            let mut large = inputs[0].first()?.largest.clone();
            for file in &inputs[0][1..] {
                if file.smallest < small {
                    small = file.smallest.clone();
                }
                if file.largest > large {
                    large = file.largest.clone();
                }
            }
            smallest = small;
            largest = large;
        } else {
            let chosen = self.files[level]
                .iter()
                .find(|f| match &self.compact_pointer[level] {
                    None => true,
                    Some(cursor) => f.largest > *cursor,
                })
                .or_else(|| self.files[level].first())?;
            inputs[0].push(Arc::clone(chosen));
            smallest = chosen.smallest.clone();
            largest = chosen.largest.clone();
        }

        for file in &self.files[level + 1] {
            if file.largest < smallest || file.smallest > largest {
                // Entirely before or after the input range.
                continue;
            }
            inputs[1].push(Arc::clone(file));
        }

        Some(Compaction { level, inputs })
    }

    /// Scores every level and returns the worst one strictly above 1.0.
    ///
    /// Level 0 is scored by file count rather than bytes: its files overlap
    /// and every read merges them, so the number of files is what hurts.
    pub(crate) fn pick_compaction_level(&self, options: &Options) -> Option<usize> {
        let mut best_level = None;
        let mut best_score = 1.0f64;
        for level in 0..NUM_LEVELS - 1 {
            let score = if level == 0 {
                self.files[0].len() as f64 / options.l0_compaction_trigger as f64
            } else {
                total_file_size(&self.files[level]) as f64
                    / max_bytes_for_level(level, options.base_level_size)
            };
            if score > best_score {
                best_score = score;
                best_level = Some(level);
            }
        }
        best_level
    }

    /// Does any file at `level` intersect `[smallest, largest]` on user
    /// keys?
    pub(crate) fn overlap_in_level(&self, level: usize, smallest: &[u8], largest: &[u8]) -> bool {
        let files = &self.files[level];
        if files.is_empty() {
            return false;
        }
        if level == 0 {
            files.iter().any(|f| {
                !(smallest > f.largest.user_key.as_slice()
                    || f.smallest.user_key.as_slice() > largest)
            })
        } else {
            match files.get(find_file(files, smallest)) {
                None => false,
                Some(f) => largest > f.smallest.user_key.as_slice(),
            }
        }
    }

    /// One sub-iterator per input file, `inputs[0]` listed before
    /// `inputs[1]` so the newer level wins merge ties.
    fn make_input_iterator(&self, compaction: &Compaction) -> Result<MergingIterator> {
        let mut children: Vec<Box<dyn InternalIterator>> = Vec::new();
        for file in compaction.inputs[0].iter().chain(compaction.inputs[1].iter()) {
            children.push(Box::new(self.table_cache.new_iterator(file.number)?));
        }
        Ok(MergingIterator::new(children))
    }
}

fn total_file_size(files: &[Arc<FileMetaData>]) -> u64 {
    files.iter().map(|f| f.file_size).sum()
}

/// Byte budget for a level: `10 * base` for levels 0 and 1, ×10 per level
/// beyond. (The level-0 result is unused — level 0 is scored by file count.)
fn max_bytes_for_level(level: usize, base_level_size: u64) -> f64 {
    let mut result = 10.0 * base_level_size as f64;
    let mut level = level;
    while level > 1 {
        result *= 10.0;
        level -= 1;
    }
    result
}
