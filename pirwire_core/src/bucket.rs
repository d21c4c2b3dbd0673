//! Row addressing and the layout of a decompressed row ("bucket").
//!
//! A key lives in the row given by the top `row_bits` bits of SHA-256(key).
//! A row holds every record whose key hashed there:
//!
//! ```text
//! hash_len:u8 | (key_hash_tail[hash_len] | varint(len) | record[len])*
//! ```
//!
//! `key_hash_tail` is the last `hash_len` bytes of SHA-256(key).

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::varint;

/// Longest key-hash tail a bucket may use.
pub const MAX_HASH_LEN: usize = 32;

/// Row index of `key` in a database of `2^row_bits` rows.
pub fn row_from_key(key: &[u8], row_bits: u32) -> u64 {
    if row_bits == 0 {
        return 0;
    }
    let digest = Sha256::digest(key);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head) >> (64 - row_bits.min(64))
}

/// Find the record stored for `key` in a decompressed bucket.
///
/// `Ok(None)` means the bucket is well formed but holds no record for `key`.
pub fn extract_from_bucket(key: &[u8], bucket: &[u8]) -> Result<Option<Vec<u8>>> {
    let Some((&hash_len, mut rest)) = bucket.split_first() else {
        return Ok(None);
    };
    let hash_len = hash_len as usize;
    if hash_len == 0 || hash_len > MAX_HASH_LEN {
        return Err(Error::encoding(format!("bucket key hash length {} out of range", hash_len)));
    }

    let digest = Sha256::digest(key);
    let target = &digest[digest.len() - hash_len..];

    while !rest.is_empty() {
        if rest.len() < hash_len {
            return Err(Error::encoding("bucket entry truncated inside key hash"));
        }
        let (key_hash, after_hash) = rest.split_at(hash_len);
        let (value_len, used) = varint::decode(after_hash)?;
        let body = &after_hash[used..];
        let value_len = usize::try_from(value_len)
            .ok()
            .filter(|&len| len <= body.len())
            .ok_or_else(|| Error::encoding("bucket entry truncated inside record"))?;

        let (value, next) = body.split_at(value_len);
        if key_hash == target {
            return Ok(Some(value.to_vec()));
        }
        rest = next;
    }
    Ok(None)
}

/// Lay out records as a bucket. The inverse of repeated
/// [`extract_from_bucket`] calls; used to build fixtures and test servers.
pub fn encode_bucket<K, V>(hash_len: usize, records: &[(K, V)]) -> Result<Vec<u8>>
where
    K: AsRef<[u8]>,
    V: AsRef<[u8]>,
{
    if hash_len == 0 || hash_len > MAX_HASH_LEN {
        return Err(Error::encoding(format!("bucket key hash length {} out of range", hash_len)));
    }
    let mut out = vec![hash_len as u8];
    for (key, value) in records {
        let digest = Sha256::digest(key.as_ref());
        out.extend_from_slice(&digest[digest.len() - hash_len..]);
        varint::encode_into(value.as_ref().len() as u64, &mut out)?;
        out.extend_from_slice(value.as_ref());
    }
    Ok(out)
}
