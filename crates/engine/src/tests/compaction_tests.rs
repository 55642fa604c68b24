use std::collections::BTreeSet;
use std::sync::Arc;

use memtable::{InternalKey, Lookup, MemTable, ValueType};
use sstable::{InternalIterator, TableBuilder};
use tempfile::tempdir;

use super::helpers::{empty_version, filled_memtable, meta, small_options};
use crate::filename;
use crate::version::FileMetaData;

// -------------------- Level-0 flush --------------------

#[test]
fn empty_memtable_flush_emits_nothing() {
    let dir = tempdir().unwrap();
    let mut v = empty_version(dir.path());
    v.write_level0_table(&MemTable::new(), &small_options()).unwrap();

    assert_eq!(v.num_level_files(0), 0);
    // Not even a file number was consumed.
    assert_eq!(v.new_file_number(), 1);
}

#[test]
fn flush_lands_at_level_zero() {
    let dir = tempdir().unwrap();
    let mut v = empty_version(dir.path());
    let mem = filled_memtable(&[(1, b"apple", b"red"), (2, b"banana", b"yellow")]);

    v.write_level0_table(&mem, &small_options()).unwrap();

    assert_eq!(v.num_level_files(0), 1);
    let file = &v.files[0][0];
    assert_eq!(file.smallest.user_key, b"apple");
    assert_eq!(file.largest.user_key, b"banana");
    assert!(file.smallest.user_value.is_empty(), "boundary keys carry no payload");
    assert!(filename::table_file_name(dir.path(), file.number).exists());

    assert_eq!(v.get(b"apple").unwrap(), Lookup::Found(b"red".to_vec()));
    assert_eq!(v.get(b"banana").unwrap(), Lookup::Found(b"yellow".to_vec()));
    assert_eq!(v.get(b"cherry").unwrap(), Lookup::Missing);
}

#[test]
fn flush_preserves_tombstones() {
    let dir = tempdir().unwrap();
    let mut v = empty_version(dir.path());
    let mem = MemTable::new();
    mem.add(1, ValueType::Value, b"k", b"v");
    mem.add(2, ValueType::Deletion, b"k", b"");

    v.write_level0_table(&mem, &small_options()).unwrap();
    assert_eq!(v.get(b"k").unwrap(), Lookup::Deleted);
}

// -------------------- Selection --------------------

#[test]
fn no_level_over_budget_means_no_compaction() {
    let dir = tempdir().unwrap();
    let mut v = empty_version(dir.path());
    // Exactly at the trigger is not over it: 4 / 4 = 1.0 is not > 1.0.
    for n in 1..=4 {
        v.add_file(0, meta(n, b"a", b"z", 16));
    }
    assert_eq!(v.pick_compaction_level(&small_options()), None);
    assert!(!v.do_compaction_work(&small_options()).unwrap());
}

#[test]
fn level_zero_picked_past_trigger() {
    let dir = tempdir().unwrap();
    let mut v = empty_version(dir.path());
    for n in 1..=5 {
        v.add_file(0, meta(n, b"a", b"z", 16));
    }
    assert_eq!(v.pick_compaction_level(&small_options()), Some(0));
}

#[test]
fn deeper_level_picked_by_total_bytes() {
    let dir = tempdir().unwrap();
    let mut v = empty_version(dir.path());
    // Budget for level 1 is 10 * base_level_size = 5120 bytes.
    v.add_file(1, meta(1, b"a", b"c", 3000));
    v.add_file(1, meta(2, b"e", b"g", 3000));
    assert_eq!(v.pick_compaction_level(&small_options()), Some(1));

    // Under budget: nothing to do.
    let mut calm = empty_version(dir.path());
    calm.add_file(1, meta(1, b"a", b"c", 1000));
    assert_eq!(calm.pick_compaction_level(&small_options()), None);
}

#[test]
fn worst_scoring_level_wins() {
    let dir = tempdir().unwrap();
    let mut v = empty_version(dir.path());
    // Level 1 at ~1.2x budget, level 2 at ~2x budget (budget 51200).
    v.add_file(1, meta(1, b"a", b"c", 6000));
    v.add_file(2, meta(2, b"a", b"c", 102400));
    assert_eq!(v.pick_compaction_level(&small_options()), Some(2));
}

// -------------------- Trivial move --------------------

#[test]
fn single_input_with_no_overlap_moves_without_rewrite() {
    let dir = tempdir().unwrap();
    let mut v = empty_version(dir.path());
    // Oversized level-1 file, nothing at level 2: pure metadata relocation,
    // the (nonexistent) file on disk is never opened.
    v.add_file(1, meta(9, b"a", b"m", 100_000));

    assert!(v.do_compaction_work(&small_options()).unwrap());
    assert_eq!(v.num_level_files(1), 0);
    assert_eq!(v.num_level_files(2), 1);
    assert_eq!(v.files[2][0].number, 9, "same file, same identity");
}

// -------------------- Merge execution --------------------

/// Flushes five overlapping memtables and compacts; checks placement,
/// freshness, and duplicate elimination across the outputs.
#[test]
fn level0_merge_keeps_only_freshest_records() {
    let dir = tempdir().unwrap();
    let opts = small_options();
    let mut v = empty_version(dir.path());

    // Five generations of writes to the same three keys.
    let mut seq = 0u64;
    for generation in 0..5u8 {
        let mem = MemTable::new();
        for key in [b"a", b"b", b"c"] {
            seq += 1;
            mem.add(seq, ValueType::Value, key, &[b'0' + generation]);
        }
        v.write_level0_table(&mem, &opts).unwrap();
    }
    assert_eq!(v.num_level_files(0), 5);

    assert!(v.do_compaction_work(&opts).unwrap());
    assert_eq!(v.num_level_files(0), 0, "all level-0 inputs consumed");
    assert!(v.num_level_files(1) > 0, "outputs land one level down");

    for key in [b"a", b"b", b"c"] {
        assert_eq!(v.get(key).unwrap(), Lookup::Found(vec![b'4']));
    }

    // At most one record per user key across all outputs.
    let mut seen: BTreeSet<Vec<u8>> = BTreeSet::new();
    for file in &v.files[1] {
        let mut iter = v.table_cache.new_iterator(file.number).unwrap();
        iter.seek_to_first();
        while let Some(key) = iter.internal_key().cloned() {
            assert!(
                seen.insert(key.user_key.clone()),
                "user key {:?} appears twice in compaction output",
                String::from_utf8_lossy(&key.user_key)
            );
            iter.next();
        }
        iter.status().unwrap();
    }
    assert_eq!(seen.len(), 3);
}

#[test]
fn outputs_rotate_at_max_file_size_and_stay_disjoint() {
    let dir = tempdir().unwrap();
    let opts = small_options();
    let mut v = empty_version(dir.path());

    // Plenty of distinct keys so the merged output exceeds one 128-byte
    // file several times over.
    let mut seq = 0u64;
    for generation in 0..5u32 {
        let mem = MemTable::new();
        for i in 0..20u32 {
            seq += 1;
            let key = format!("key{:04}", i * 5 + generation);
            mem.add(seq, ValueType::Value, key.as_bytes(), b"some value");
        }
        v.write_level0_table(&mem, &opts).unwrap();
    }

    assert!(v.do_compaction_work(&opts).unwrap());
    assert!(
        v.num_level_files(1) > 1,
        "tiny max_file_size must split the output"
    );

    // Disjoint and sorted by smallest key.
    let files = &v.files[1];
    for pair in files.windows(2) {
        assert!(
            pair[0].largest.user_key < pair[1].smallest.user_key,
            "level-1 files must not overlap"
        );
    }

    // Everything is still readable.
    for i in 0..100u32 {
        let key = format!("key{:04}", i);
        assert_eq!(
            v.get(key.as_bytes()).unwrap(),
            Lookup::Found(b"some value".to_vec()),
            "missing {key}"
        );
    }
}

#[test]
fn merge_compacts_tombstones_over_older_values() {
    let dir = tempdir().unwrap();
    let opts = small_options();
    let mut v = empty_version(dir.path());

    let mut seq = 0u64;
    // Four generations of live values...
    for _ in 0..4 {
        let mem = MemTable::new();
        for key in [b"x", b"y"] {
            seq += 1;
            mem.add(seq, ValueType::Value, key, b"live");
        }
        v.write_level0_table(&mem, &opts).unwrap();
    }
    // ...then a deletion of one key.
    let mem = MemTable::new();
    seq += 1;
    mem.add(seq, ValueType::Deletion, b"x", b"");
    v.write_level0_table(&mem, &opts).unwrap();

    assert!(v.do_compaction_work(&opts).unwrap());
    assert_eq!(v.get(b"x").unwrap(), Lookup::Deleted);
    assert_eq!(v.get(b"y").unwrap(), Lookup::Found(b"live".to_vec()));
}

#[test]
fn out_of_order_input_is_fatal() {
    let dir = tempdir().unwrap();
    let opts = small_options();
    let mut v = empty_version(dir.path());

    // A table whose records violate the ordering contract (the builder does
    // not re-sort), surrounded by enough healthy files to trigger a merge.
    let bad_number = v.new_file_number();
    let mut bad = TableBuilder::new(filename::table_file_name(dir.path(), bad_number)).unwrap();
    bad.add(&InternalKey::new(1, ValueType::Value, b"m", b"")).unwrap();
    bad.add(&InternalKey::new(2, ValueType::Value, b"b", b"")).unwrap();
    let bad_size = bad.finish().unwrap();
    v.add_file(
        0,
        Arc::new(FileMetaData {
            number: bad_number,
            file_size: bad_size,
            allow_seeks: 1 << 30,
            smallest: InternalKey::new(1, ValueType::Value, b"b", b""),
            largest: InternalKey::new(2, ValueType::Value, b"m", b""),
        }),
    );
    for i in 0..4u64 {
        let mem = filled_memtable(&[(10 + i, b"q", b"v")]);
        v.write_level0_table(&mem, &opts).unwrap();
    }

    assert!(v.do_compaction_work(&opts).is_err());
}

#[test]
fn merge_advances_the_compaction_cursor() {
    let dir = tempdir().unwrap();
    let opts = small_options();
    let mut v = empty_version(dir.path());

    // Real file at level 2 overlapping the level-1 victim, so the work is a
    // genuine merge rather than a trivial move.
    let old = filled_memtable(&[(1, b"a", b"old"), (2, b"c", b"old")]);
    v.write_level0_table(&old, &opts).unwrap();
    let old_meta = Arc::clone(&v.files[0][0]);
    v.delete_file(0, old_meta.number);
    v.add_file(2, old_meta);

    let new = filled_memtable(&[(3, b"a", b"new"), (4, b"c", b"new")]);
    v.write_level0_table(&new, &opts).unwrap();
    let new_meta = Arc::clone(&v.files[0][0]);
    v.delete_file(0, new_meta.number);
    // Inflate the accounted size so level 1 scores above its budget.
    v.add_file(
        1,
        Arc::new(FileMetaData {
            number: new_meta.number,
            file_size: 100_000,
            allow_seeks: new_meta.allow_seeks,
            smallest: new_meta.smallest.clone(),
            largest: new_meta.largest.clone(),
        }),
    );

    assert!(v.compact_pointer[1].is_none());
    assert!(v.do_compaction_work(&opts).unwrap());

    let cursor = v.compact_pointer[1].as_ref().expect("cursor must advance");
    assert_eq!(cursor.user_key, b"c");

    assert_eq!(v.num_level_files(1), 0);
    assert!(v.num_level_files(2) > 0);
    assert_eq!(v.get(b"a").unwrap(), Lookup::Found(b"new".to_vec()));
    assert_eq!(v.get(b"c").unwrap(), Lookup::Found(b"new".to_vec()));
}
