use std::path::Path;
use std::sync::Arc;

use memtable::{InternalKey, ValueType};

use crate::{Table, TableBuilder};


/// Builds a table file from records (already in comparator order) and opens it.
pub(crate) fn build_table(path: &Path, records: &[InternalKey]) -> Arc<Table> {
    let mut builder = TableBuilder::new(path).unwrap();
    for record in records {
        builder.add(record).unwrap();
    }
    builder.finish().unwrap();
    Arc::new(Table::open(path).unwrap())
}

pub(crate) fn value(seq: u64, key: &[u8], val: &[u8]) -> InternalKey {
    InternalKey::new(seq, ValueType::Value, key, val)
}

pub(crate) fn tombstone(seq: u64, key: &[u8]) -> InternalKey {
    InternalKey::new(seq, ValueType::Deletion, key, b"")
}
