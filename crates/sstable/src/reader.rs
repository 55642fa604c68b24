//! Table file reader: point lookups and ordered iteration.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, ensure, Result};
use bloom::BloomFilter;
use byteorder::{LittleEndian, ReadBytesExt};
use memtable::{InternalKey, Lookup, ValueType};
use parking_lot::Mutex;

use crate::format::{read_footer, MAX_KEY_BYTES, MAX_RECORD_BYTES};
use crate::iter::InternalIterator;

/// An opened table file.
///
/// [`open`](Table::open) loads the footer, the bloom filter and the full
/// index into memory; record bodies stay on disk and are read (and
/// CRC-verified) on demand through a persistent file handle. The handle is
/// behind a `Mutex` so lookups and any number of iterators can share one
/// `Arc<Table>` — each access re-seeks, so interleaving is harmless.
pub struct Table {
    path: PathBuf,
    file: Mutex<BufReader<File>>,
    /// `(user_key, offset of its freshest record)`, ascending by user key.
    index: Vec<(Vec<u8>, u64)>,
    bloom: BloomFilter,
    /// Exclusive end of the data section.
    data_end: u64,
}

impl Table {
    /// Opens a table file and loads its metadata sections.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut f = File::open(&path)?;
        let (footer, file_size) = read_footer(&mut f)?;

        f.seek(SeekFrom::Start(footer.bloom_offset))?;
        let mut f = BufReader::new(f);
        let bloom = BloomFilter::decode_from(&mut f)?;

        f.seek(SeekFrom::Start(footer.index_offset))?;
        let index_end = file_size - crate::format::FOOTER_BYTES;
        let mut index = Vec::new();
        let mut pos = footer.index_offset;
        while pos < index_end {
            let key_len = f.read_u32::<LittleEndian>()? as usize;
            ensure!(
                key_len <= MAX_KEY_BYTES,
                "corrupt index: key length {} exceeds cap",
                key_len
            );
            let mut user_key = vec![0u8; key_len];
            f.read_exact(&mut user_key)?;
            let record_offset = f.read_u64::<LittleEndian>()?;
            ensure!(
                record_offset < footer.bloom_offset,
                "corrupt index: record offset {} outside data section",
                record_offset
            );
            index.push((user_key, record_offset));
            pos += 4 + key_len as u64 + 8;
        }

        Ok(Self {
            path,
            file: Mutex::new(f),
            index,
            bloom,
            data_end: footer.bloom_offset,
        })
    }

    /// Point lookup by user key.
    ///
    /// The bloom filter screens definite misses, then the index is
    /// binary-searched; on a hit the freshest record for the key is read and
    /// verified. A tombstone record answers [`Lookup::Deleted`].
    pub fn get(&self, user_key: &[u8]) -> Result<Lookup> {
        if !self.bloom.may_contain(user_key) {
            return Ok(Lookup::Missing);
        }
        let slot = match self
            .index
            .binary_search_by(|(key, _)| key.as_slice().cmp(user_key))
        {
            Ok(slot) => slot,
            Err(_) => return Ok(Lookup::Missing),
        };

        let (record, _) = self.read_record_at(self.index[slot].1)?;
        ensure!(
            record.user_key == user_key,
            "index of {} points at mismatching record",
            self.path.display()
        );
        Ok(match record.value_type {
            ValueType::Value => Lookup::Found(record.user_value),
            ValueType::Deletion => Lookup::Deleted,
        })
    }

    /// Number of distinct user keys in the file.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if the file holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Ordered iterator over every record in the data section.
    ///
    /// Consumes one strong reference to the table: the iterator owns it, so
    /// it stays usable even if the table cache evicts the handle meanwhile.
    pub fn new_iterator(self: Arc<Self>) -> TableIterator {
        TableIterator {
            table: self,
            next_offset: 0,
            current: None,
            status: None,
        }
    }

    /// Reads and CRC-verifies the record at `offset`, returning it together
    /// with its on-disk length.
    fn read_record_at(&self, offset: u64) -> Result<(InternalKey, u64)> {
        let mut f = self.file.lock();
        f.seek(SeekFrom::Start(offset))?;

        let stored_crc = f.read_u32::<LittleEndian>()?;
        let body_len = f.read_u32::<LittleEndian>()? as usize;
        ensure!(
            body_len <= MAX_RECORD_BYTES,
            "corrupt record at {}: body length {} exceeds cap",
            offset,
            body_len
        );
        let mut body = vec![0u8; body_len];
        f.read_exact(&mut body)?;
        drop(f);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&body);
        let actual_crc = hasher.finalize();
        if actual_crc != stored_crc {
            bail!(
                "crc mismatch in {} at offset {}: stored {:#010x}, computed {:#010x}",
                self.path.display(),
                offset,
                stored_crc,
                actual_crc
            );
        }

        let record = InternalKey::decode_from(&mut body.as_slice())?;
        Ok((record, 8 + body_len as u64))
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("path", &self.path)
            .field("distinct_keys", &self.index.len())
            .field("data_bytes", &self.data_end)
            .finish()
    }
}

/// Sequential walk over a table's data section in comparator order.
pub struct TableIterator {
    table: Arc<Table>,
    /// Offset of the next record to decode; `data_end` means exhausted.
    next_offset: u64,
    current: Option<InternalKey>,
    status: Option<anyhow::Error>,
}

impl TableIterator {
    fn step(&mut self) {
        if self.next_offset >= self.table.data_end {
            self.current = None;
            return;
        }
        match self.table.read_record_at(self.next_offset) {
            Ok((record, len)) => {
                self.next_offset += len;
                self.current = Some(record);
            }
            Err(e) => {
                self.status = Some(e);
                self.current = None;
            }
        }
    }
}

impl InternalIterator for TableIterator {
    fn seek_to_first(&mut self) {
        self.next_offset = 0;
        self.current = None;
        self.step();
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn next(&mut self) {
        if self.current.is_some() {
            self.step();
        }
    }

    fn internal_key(&self) -> Option<&InternalKey> {
        self.current.as_ref()
    }

    fn status(&mut self) -> Result<()> {
        match self.status.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
