//! # SSTable - Sorted String Table
//!
//! Immutable, on-disk record files for the UndertowKV storage engine.
//!
//! A table file is written once — by a memtable flush or by compaction — and
//! then only ever read, until a later compaction replaces it. Records are
//! full [`memtable::InternalKey`]s in comparator order, so one file may hold
//! several records for the same user key (flushes preserve memtable
//! duplicates; only compaction deduplicates).
//!
//! ## File layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ DATA SECTION                                                 │
//! │                                                              │
//! │ crc32 (u32) | body_len (u32) | body                          │
//! │   body = seq (u64) | type (i8) | key_len (i32) | user_key    │
//! │        | value_len (i32) | user_value                        │
//! │                                                              │
//! │ ... repeated for each record, in comparator order ...        │
//! ├──────────────────────────────────────────────────────────────┤
//! │ BLOOM SECTION (serialized BloomFilter over user keys)        │
//! │                                                              │
//! │ num_bits (u64) | num_hashes (u32) | bits_len (u32) | bits    │
//! ├──────────────────────────────────────────────────────────────┤
//! │ INDEX SECTION (one entry per distinct user key)              │
//! │                                                              │
//! │ key_len (u32) | user_key | record_offset (u64)               │
//! │                                                              │
//! │ The offset points at the FIRST record for that user key,     │
//! │ which by the comparator (seq descending) is the freshest.    │
//! ├──────────────────────────────────────────────────────────────┤
//! │ FOOTER (always last 20 bytes)                                │
//! │                                                              │
//! │ bloom_offset (u64) | index_offset (u64) | magic (u32)        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The per-record CRC32 covers the body and
//! is verified on every read, so silent disk corruption surfaces as an error
//! instead of a wrong answer.

mod builder;
mod format;
mod iter;
mod merge;
mod reader;

pub use builder::TableBuilder;
pub use format::{FOOTER_BYTES, TABLE_MAGIC};
pub use iter::InternalIterator;
pub use merge::MergingIterator;
pub use reader::{Table, TableIterator};

#[cfg(test)]
mod tests;
