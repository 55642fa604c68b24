//! The record unit every layer of the store sorts and ships around.
//!
//! An [`InternalKey`] packs the user key together with the write's sequence
//! number, its kind (value or tombstone), and the payload. The total order —
//! user key ascending, then sequence descending, then kind descending — is
//! what makes point lookups land on the freshest record: probing with
//! `seq = u64::MAX` sorts immediately before every real record for that key.

use std::cmp::Ordering;
use std::io::{Read, Write};

use anyhow::{bail, ensure, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Kind of a record: a live value or a deletion tombstone.
///
/// The discriminants are part of the wire format (encoded as `i8`) and of
/// the comparator (kind descending, so a value sorts before a tombstone when
/// sequence numbers tie — unreachable in practice since sequences are unique,
/// but it keeps the order total).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum ValueType {
    /// Tombstone: the key's most recent write is a delete.
    Deletion = 0,
    /// Live value.
    Value = 1,
}

impl ValueType {
    fn from_i8(raw: i8) -> Result<Self> {
        match raw {
            0 => Ok(ValueType::Deletion),
            1 => Ok(ValueType::Value),
            other => bail!("invalid value type byte {}", other),
        }
    }
}

/// A single record: `(user_key, seq, type, user_value)`.
///
/// Immutable after construction; key and value bytes are owned copies.
/// Tombstones and the boundary keys kept in file metadata carry an empty
/// `user_value`.
#[derive(Debug, Clone)]
pub struct InternalKey {
    pub user_key: Vec<u8>,
    pub seq: u64,
    pub value_type: ValueType,
    pub user_value: Vec<u8>,
}

impl InternalKey {
    /// Builds a record, copying the key and value bytes.
    pub fn new(seq: u64, value_type: ValueType, user_key: &[u8], user_value: &[u8]) -> Self {
        Self {
            user_key: user_key.to_vec(),
            seq,
            value_type,
            user_value: user_value.to_vec(),
        }
    }

    /// Probe key for a point lookup: sorts before every real record for
    /// `user_key`, so a seek lands on the freshest one.
    pub fn lookup(user_key: &[u8]) -> Self {
        Self::new(u64::MAX, ValueType::Value, user_key, b"")
    }

    /// Copy with the payload dropped; file metadata stores boundary keys in
    /// this form.
    #[must_use]
    pub fn without_value(&self) -> Self {
        Self {
            user_key: self.user_key.clone(),
            seq: self.seq,
            value_type: self.value_type,
            user_value: Vec::new(),
        }
    }

    /// Writes the packed little-endian form:
    /// `seq (u64) | type (i8) | key_len (i32) | user_key | value_len (i32) | user_value`.
    pub fn encode_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u64::<LittleEndian>(self.seq)?;
        w.write_i8(self.value_type as i8)?;
        w.write_i32::<LittleEndian>(self.user_key.len() as i32)?;
        w.write_all(&self.user_key)?;
        w.write_i32::<LittleEndian>(self.user_value.len() as i32)?;
        w.write_all(&self.user_value)?;
        Ok(())
    }

    /// Inverse of [`encode_to`](Self::encode_to).
    pub fn decode_from<R: Read>(r: &mut R) -> Result<Self> {
        let seq = r.read_u64::<LittleEndian>()?;
        let value_type = ValueType::from_i8(r.read_i8()?)?;

        let key_len = r.read_i32::<LittleEndian>()?;
        ensure!(key_len >= 0, "negative key length {}", key_len);
        let mut user_key = vec![0u8; key_len as usize];
        r.read_exact(&mut user_key)?;

        let value_len = r.read_i32::<LittleEndian>()?;
        ensure!(value_len >= 0, "negative value length {}", value_len);
        let mut user_value = vec![0u8; value_len as usize];
        r.read_exact(&mut user_value)?;

        Ok(Self {
            user_key,
            seq,
            value_type,
            user_value,
        })
    }

    /// Size of the encoded form in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        8 + 1 + 4 + self.user_key.len() + 4 + self.user_value.len()
    }
}

/// User key ascending, sequence descending, kind descending. The payload
/// never participates.
impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.user_key
            .cmp(&other.user_key)
            .then_with(|| other.seq.cmp(&self.seq))
            .then_with(|| (other.value_type as i8).cmp(&(self.value_type as i8)))
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Equality agrees with [`Ord`]: records with the same key, sequence, and
/// kind are the same record (sequences are never reissued).
impl PartialEq for InternalKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for InternalKey {}
