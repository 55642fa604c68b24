//! Streaming table file writer.

use std::fs::{rename, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use bloom::BloomFilter;
use byteorder::{LittleEndian, WriteBytesExt};
use memtable::InternalKey;

use crate::format::{write_footer, Footer};

/// Bloom filter false positive target for table files (1%).
const BLOOM_FPR: f64 = 0.01;

/// Writes records in comparator order into a new table file.
///
/// The builder streams: records go straight to a buffered temp file while
/// only the index (one entry per distinct user key) and the bloom keys stay
/// in memory. [`finish`](TableBuilder::finish) appends the bloom, index and
/// footer sections, fsyncs, and atomically renames the temp file into place;
/// a crash mid-build leaves only a `.tmp` file that recovery ignores.
///
/// [`file_size`](TableBuilder::file_size) is cheap and callable mid-stream —
/// compaction polls it to decide when to rotate to a new output file.
pub struct TableBuilder {
    path: PathBuf,
    tmp_path: PathBuf,
    file: BufWriter<File>,
    /// `(user_key, offset of its first record)`, in insertion order, which
    /// the caller's ordering contract makes ascending.
    index: Vec<(Vec<u8>, u64)>,
    /// Bytes written so far; after `finish` this is the final file size.
    offset: u64,
    record_buf: Vec<u8>,
}

impl TableBuilder {
    /// Opens a temp file next to `path` and prepares an empty table.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tmp_path = {
            let mut name = path.as_os_str().to_os_string();
            name.push(".tmp");
            PathBuf::from(name)
        };
        let raw = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        Ok(Self {
            path,
            tmp_path,
            file: BufWriter::new(raw),
            index: Vec::new(),
            offset: 0,
            record_buf: Vec::with_capacity(256),
        })
    }

    /// Appends one record.
    ///
    /// Records must arrive in strictly increasing [`InternalKey`] order; the
    /// index relies on the first record per user key being the freshest.
    pub fn add(&mut self, key: &InternalKey) -> Result<()> {
        self.record_buf.clear();
        key.encode_to(&mut self.record_buf)?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.record_buf);
        let crc = hasher.finalize();

        // Index only the first record of each user key.
        if self
            .index
            .last()
            .map(|(last, _)| last.as_slice() != key.user_key.as_slice())
            .unwrap_or(true)
        {
            self.index.push((key.user_key.clone(), self.offset));
        }

        self.file.write_u32::<LittleEndian>(crc)?;
        self.file.write_u32::<LittleEndian>(self.record_buf.len() as u32)?;
        self.file.write_all(&self.record_buf)?;
        self.offset += 8 + self.record_buf.len() as u64;
        Ok(())
    }

    /// Bytes written so far (final size once [`finish`](Self::finish) ran).
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.offset
    }

    /// Writes the bloom, index and footer sections, fsyncs, and renames the
    /// temp file to its final path. Returns the total file size.
    ///
    /// # Errors
    ///
    /// Refuses to finish an empty table — the caller decides not to emit a
    /// file at all in that case — and fails on any IO error (the temp file
    /// is removed on the empty-table path).
    pub fn finish(mut self) -> Result<u64> {
        if self.index.is_empty() {
            drop(self.file);
            let _ = std::fs::remove_file(&self.tmp_path);
            anyhow::bail!("refusing to finish an empty table file");
        }

        let bloom_offset = self.offset;
        let mut filter = BloomFilter::new(self.index.len(), BLOOM_FPR);
        for (user_key, _) in &self.index {
            filter.insert(user_key);
        }
        filter.encode_to(&mut self.file)?;
        self.offset += filter.encoded_len() as u64;

        let index_offset = self.offset;
        for (user_key, record_offset) in &self.index {
            self.file.write_u32::<LittleEndian>(user_key.len() as u32)?;
            self.file.write_all(user_key)?;
            self.file.write_u64::<LittleEndian>(*record_offset)?;
            self.offset += 4 + user_key.len() as u64 + 8;
        }

        write_footer(
            &mut self.file,
            Footer {
                bloom_offset,
                index_offset,
            },
        )?;
        self.offset += crate::format::FOOTER_BYTES;

        self.file.flush()?;
        self.file.into_inner()?.sync_all()?;
        rename(&self.tmp_path, &self.path)?;

        // Make the rename itself durable on filesystems that need it.
        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        Ok(self.offset)
    }
}
