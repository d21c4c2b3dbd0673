//! Chunk batches: an ordered list of opaque byte chunks.
//!
//! ```text
//! u64 LE count | (u64 LE len_i | chunk_i)*
//! ```
//!
//! Position `i` of a request batch corresponds to position `i` of the
//! response batch.

use crate::error::{Error, Result};
use crate::format::CHUNK_LEN_FIELD_SIZE;

/// Serialize `chunks` into a single batch.
pub fn serialize_chunks<C: AsRef<[u8]>>(chunks: &[C]) -> Vec<u8> {
    let total: usize = chunks.iter().map(|c| c.as_ref().len()).sum();
    let mut out = Vec::with_capacity(CHUNK_LEN_FIELD_SIZE * (chunks.len() + 1) + total);
    out.extend_from_slice(&(chunks.len() as u64).to_le_bytes());
    for chunk in chunks {
        let chunk = chunk.as_ref();
        out.extend_from_slice(&(chunk.len() as u64).to_le_bytes());
        out.extend_from_slice(chunk);
    }
    out
}

/// Inverse of [`serialize_chunks`].
///
/// Fails if any declared length runs past the end of `data`. Bytes after the
/// last declared chunk are ignored.
pub fn deserialize_chunks(data: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut offset = 0;
    let count = read_len(data, &mut offset, "chunk count")?;

    // Every chunk needs at least its length field; reject absurd counts
    // before allocating for them.
    let remaining = data.len() - offset;
    if count > (remaining / CHUNK_LEN_FIELD_SIZE) as u64 {
        return Err(Error::encoding(format!(
            "batch declares {} chunks but only {} bytes remain",
            count, remaining
        )));
    }

    let mut chunks = Vec::with_capacity(count as usize);
    for idx in 0..count {
        let len = read_len(data, &mut offset, "chunk length")?;
        let end = usize::try_from(len)
            .ok()
            .and_then(|len| offset.checked_add(len))
            .filter(|&end| end <= data.len())
            .ok_or_else(|| {
                Error::encoding(format!(
                    "chunk {} declares {} bytes but only {} remain",
                    idx,
                    len,
                    data.len() - offset
                ))
            })?;
        chunks.push(data[offset..end].to_vec());
        offset = end;
    }
    Ok(chunks)
}

fn read_len(data: &[u8], offset: &mut usize, what: &str) -> Result<u64> {
    let end = *offset + CHUNK_LEN_FIELD_SIZE;
    let field: [u8; CHUNK_LEN_FIELD_SIZE] = data
        .get(*offset..end)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| Error::encoding(format!("truncated {} at offset {}", what, offset)))?;
    *offset = end;
    Ok(u64::from_le_bytes(field))
}
