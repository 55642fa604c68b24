use std::collections::HashMap;

use anyhow::Result;
use rand::Rng;
use tempfile::tempdir;

use super::helpers::{small_options, wait_until};
use crate::{Db, Lookup};

#[test]
fn put_assigns_monotonic_sequences() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::open(dir.path().join("db"), small_options())?;
    assert_eq!(db.last_seq(), 0);

    db.put(b"a", b"1")?;
    db.put(b"b", b"2")?;
    db.delete(b"a")?;
    assert_eq!(db.last_seq(), 3, "one sequence per admitted write");
    Ok(())
}

#[test]
fn rejects_empty_and_oversized_keys() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::open(dir.path().join("db"), small_options())?;

    assert!(db.put(b"", b"v").is_err());
    assert!(db.delete(b"").is_err());

    let huge_key = vec![b'k'; crate::MAX_KEY_SIZE + 1];
    assert!(db.put(&huge_key, b"v").is_err());

    let huge_value = vec![b'v'; crate::MAX_VALUE_SIZE + 1];
    assert!(db.put(b"k", &huge_value).is_err());
    Ok(())
}

#[test]
fn filling_the_write_buffer_forces_one_flush() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::open(dir.path().join("db"), small_options())?;

    // One write puts the memtable past its 512-byte budget...
    db.put(b"big", &vec![b'x'; 600])?;
    assert_eq!(db.num_level_files(0), 0, "promotion happens on the next write");

    // ...and the next admission promotes and flushes it.
    db.put(b"small", b"v")?;
    assert!(
        wait_until(|| db.num_level_files(0) == 1),
        "expected exactly one level-0 file"
    );
    assert_eq!(db.num_level_files(0), 1);

    // Both writes stay readable: one from the file, one from the memtable.
    assert_eq!(db.get(b"big")?, Lookup::Found(vec![b'x'; 600]));
    assert_eq!(db.get(b"small")?, Lookup::Found(b"v".to_vec()));
    Ok(())
}

#[test]
fn sustained_writes_reach_level_one() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::open(dir.path().join("db"), small_options())?;

    // Each key is rewritten four times; the volume forces many flushes and
    // eventually a level-0 compaction.
    for i in 0..200u32 {
        let key = format!("key{:03}", i % 50);
        let value = format!("value-{:03}", i);
        db.put(key.as_bytes(), value.as_bytes())?;
    }
    assert!(
        wait_until(|| db.num_level_files(1) > 0),
        "compaction never populated level 1"
    );

    // Latest generation wins for every key.
    for k in 0..50u32 {
        let key = format!("key{:03}", k);
        let expected = format!("value-{:03}", k + 150);
        assert_eq!(
            db.get(key.as_bytes())?,
            Lookup::Found(expected.into_bytes()),
            "stale read for {key}"
        );
    }
    Ok(())
}

#[test]
fn random_single_digit_workload() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::open(dir.path().join("db"), small_options())?;

    let mut rng = rand::thread_rng();
    let mut expected: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();
    for _ in 0..100 {
        let digit = rng.gen_range(0..10u32).to_string().into_bytes();
        db.put(&digit, &digit)?;
        expected.insert(digit.clone(), digit);
    }

    for (key, value) in &expected {
        assert_eq!(db.get(key)?, Lookup::Found(value.clone()));
    }
    for digit in 0..10u32 {
        let key = digit.to_string().into_bytes();
        if !expected.contains_key(&key) {
            assert_eq!(db.get(&key)?, Lookup::Missing);
        }
    }
    Ok(())
}

#[test]
fn concurrent_writers_and_readers() -> Result<()> {
    use std::sync::Arc;

    let dir = tempdir()?;
    let db = Arc::new(Db::open(dir.path().join("db"), small_options())?);

    let writers: Vec<_> = (0..4u32)
        .map(|w| {
            let db = Arc::clone(&db);
            std::thread::spawn(move || {
                for i in 0..50u32 {
                    let key = format!("w{}-{:03}", w, i);
                    db.put(key.as_bytes(), b"payload").unwrap();
                }
            })
        })
        .collect();
    for handle in writers {
        handle.join().unwrap();
    }

    for w in 0..4u32 {
        for i in 0..50u32 {
            let key = format!("w{}-{:03}", w, i);
            assert_eq!(db.get(key.as_bytes())?, Lookup::Found(b"payload".to_vec()));
        }
    }
    assert_eq!(db.last_seq(), 200);
    Ok(())
}
