//! Bloom filter used to test which candidate keys exist server-side before
//! spending private reads on them.
//!
//! Wire layout: `k:u32 LE | bits:u32 LE | 2^(bits-3) bytes of bit data`.
//!
//! Hash `i` of a key is `SHA-1(LE_u32(i) ++ key)`; its top `bits` bits, read
//! most-significant first, give the bit index. Bits are addressed MSB-first
//! within each byte.
//!
//! Lookups never return false for an inserted key; they may return true for
//! a key that was never inserted.

use rayon::prelude::*;
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::format::{FILTER_BITS_MAX, FILTER_BITS_MIN, FILTER_HEADER_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    k: u32,
    bits: u32,
    data: Vec<u8>,
}

impl BloomFilter {
    /// Allocate an empty filter with `k` hash functions and `2^bits` bits.
    pub fn new(k: u32, bits: u32) -> Result<Self> {
        validate_params(k, bits)?;
        Ok(Self {
            k,
            bits,
            data: vec![0u8; data_len(bits)],
        })
    }

    /// Parse a filter received from the server.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() < FILTER_HEADER_SIZE {
            return Err(Error::filter(format!(
                "need {} header bytes, got {}",
                FILTER_HEADER_SIZE,
                raw.len()
            )));
        }
        let k = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let bits = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
        validate_params(k, bits)?;

        let data = &raw[FILTER_HEADER_SIZE..];
        if data.len() != data_len(bits) {
            return Err(Error::filter(format!(
                "bits={} requires {} data bytes, got {}",
                bits,
                data_len(bits),
                data.len()
            )));
        }

        Ok(Self {
            k,
            bits,
            data: data.to_vec(),
        })
    }

    /// Serialize to the wire layout accepted by [`BloomFilter::from_bytes`].
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FILTER_HEADER_SIZE + self.data.len());
        out.extend_from_slice(&self.k.to_le_bytes());
        out.extend_from_slice(&self.bits.to_le_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Size of the bit array in bytes.
    pub fn len_bytes(&self) -> usize {
        self.data.len()
    }

    /// Number of set bits; useful for estimating fill rate.
    pub fn count_ones(&self) -> u64 {
        self.data.iter().map(|b| b.count_ones() as u64).sum()
    }

    /// True iff every bit derived from `key` is set.
    pub fn lookup(&self, key: impl AsRef<[u8]>) -> bool {
        let key = key.as_ref();
        (0..self.k).all(|i| self.check_bit(self.hash(key, i)))
    }

    /// Set every bit derived from `key`.
    pub fn insert(&mut self, key: impl AsRef<[u8]>) {
        let key = key.as_ref();
        for i in 0..self.k {
            let idx = self.hash(key, i);
            self.set_bit(idx);
        }
    }

    pub fn insert_all<K: AsRef<[u8]>>(&mut self, keys: impl IntoIterator<Item = K>) {
        for key in keys {
            self.insert(key);
        }
    }

    /// Keys that may be members, in input order.
    ///
    /// Lookups only read the bit array, so they run in parallel.
    pub fn intersect<'a, K>(&self, keys: &'a [K]) -> Vec<&'a K>
    where
        K: AsRef<[u8]> + Sync,
    {
        keys.par_iter().filter(|key| self.lookup(key)).collect()
    }

    fn hash(&self, key: &[u8], hash_idx: u32) -> u64 {
        let mut hasher = Sha1::new();
        hasher.update(hash_idx.to_le_bytes());
        hasher.update(key);
        top_be_bits(&hasher.finalize(), self.bits)
    }

    fn check_bit(&self, idx: u64) -> bool {
        self.data[(idx >> 3) as usize] & (1u8 << (7 - (idx % 8))) != 0
    }

    fn set_bit(&mut self, idx: u64) {
        self.data[(idx >> 3) as usize] |= 1u8 << (7 - (idx % 8));
    }
}

/// The first `bits` bits of `digest`, most-significant first, as an integer.
fn top_be_bits(digest: &[u8], bits: u32) -> u64 {
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head) >> (64 - bits)
}

fn data_len(bits: u32) -> usize {
    1usize << (bits - 3)
}

fn validate_params(k: u32, bits: u32) -> Result<()> {
    if k == 0 {
        return Err(Error::filter("hash count k must be at least 1"));
    }
    if !(FILTER_BITS_MIN..=FILTER_BITS_MAX).contains(&bits) {
        return Err(Error::filter(format!(
            "bits={} outside {}..={}",
            bits, FILTER_BITS_MIN, FILTER_BITS_MAX
        )));
    }
    Ok(())
}
