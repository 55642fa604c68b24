//! # Bloom filter
//!
//! Probabilistic set-membership filter embedded in every table file.
//!
//! A negative answer is definitive: if [`BloomFilter::may_contain`] returns
//! `false` the key is not in the file and the read path skips it without
//! touching the data section. Positive answers are only probable; the false
//! positive rate is set at construction time.
//!
//! The filter uses double hashing (`h_i = h1 + i * h2`, both derived from
//! FNV-1a with distinct bases) over a flat bit vector, and serializes to a
//! little-endian wire form stored verbatim in the table file.

use std::io::{Read, Write};

use anyhow::{ensure, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Refuse to deserialize filters above this size; a corrupt length field
/// must not drive allocation.
const MAX_FILTER_BYTES: usize = 128 * 1024 * 1024;

/// Bit-vector bloom filter with `k` derived hash functions.
pub struct BloomFilter {
    bits: Vec<u8>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomFilter {
    /// Sizes a filter for `expected_keys` entries at the given target false
    /// positive rate.
    ///
    /// Uses the standard optimum `m = -n ln(p) / ln(2)^2` bits and
    /// `k = (m/n) ln(2)` hashes, clamped to at least eight bits and one hash.
    ///
    /// # Panics
    ///
    /// Panics if `expected_keys` is zero or `false_positive_rate` is outside
    /// `(0, 1)`.
    pub fn new(expected_keys: usize, false_positive_rate: f64) -> Self {
        assert!(expected_keys > 0, "expected_keys must be > 0");
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "false_positive_rate must be in (0, 1)"
        );

        let n = expected_keys as f64;
        let ln2 = std::f64::consts::LN_2;
        let num_bits = ((-n * false_positive_rate.ln()) / (ln2 * ln2)).ceil().max(8.0) as u64;
        let num_hashes = (((num_bits as f64) / n) * ln2).ceil().max(1.0) as u32;

        Self {
            bits: vec![0u8; num_bits.div_ceil(8) as usize],
            num_bits,
            num_hashes,
        }
    }

    /// Adds a key to the filter.
    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_hashes {
            let bit = self.probe(h1, h2, i);
            self.bits[(bit / 8) as usize] |= 1 << (bit % 8);
        }
    }

    /// Returns `false` if the key is definitely absent.
    #[must_use]
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_pair(key);
        (0..self.num_hashes).all(|i| {
            let bit = self.probe(h1, h2, i);
            self.bits[(bit / 8) as usize] & (1 << (bit % 8)) != 0
        })
    }

    /// Bytes the serialized form occupies.
    ///
    /// Wire layout: `num_bits (u64) | num_hashes (u32) | bits_len (u32) | bits`.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        8 + 4 + 4 + self.bits.len()
    }

    /// Writes the filter in its little-endian wire form.
    pub fn encode_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u64::<LittleEndian>(self.num_bits)?;
        w.write_u32::<LittleEndian>(self.num_hashes)?;
        w.write_u32::<LittleEndian>(self.bits.len() as u32)?;
        w.write_all(&self.bits)?;
        Ok(())
    }

    /// Reads a filter previously written by [`encode_to`](Self::encode_to).
    pub fn decode_from<R: Read>(r: &mut R) -> Result<Self> {
        let num_bits = r.read_u64::<LittleEndian>()?;
        let num_hashes = r.read_u32::<LittleEndian>()?;
        let bits_len = r.read_u32::<LittleEndian>()? as usize;
        ensure!(
            bits_len <= MAX_FILTER_BYTES,
            "bloom filter length {} exceeds cap {}",
            bits_len,
            MAX_FILTER_BYTES
        );
        ensure!(
            num_bits.div_ceil(8) as usize == bits_len,
            "bloom filter bit count {} disagrees with byte length {}",
            num_bits,
            bits_len
        );
        let mut bits = vec![0u8; bits_len];
        r.read_exact(&mut bits)?;
        Ok(Self {
            bits,
            num_bits,
            num_hashes,
        })
    }

    fn probe(&self, h1: u64, h2: u64, i: u32) -> u64 {
        h1.wrapping_add(u64::from(i).wrapping_mul(h2)) % self.num_bits
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .finish()
    }
}

/// Two independent 64-bit hashes of `key` for double hashing.
fn hash_pair(key: &[u8]) -> (u64, u64) {
    (fnv1a(key, 0xcbf2_9ce4_8422_2325), fnv1a(key, 0x517c_c1b7_2722_0a95))
}

fn fnv1a(data: &[u8], basis: u64) -> u64 {
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    data.iter().fold(basis, |h, &b| (h ^ u64::from(b)).wrapping_mul(PRIME))
}
