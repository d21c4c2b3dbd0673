use pirwire_core::FormatError;

/// Invert a Burrows-Wheeler transform.
///
/// `last` is the last column of the sorted rotation matrix and `primary` the
/// row holding the original string. A counting sort over `last` yields, for
/// every row, the row that follows it in the original text.
pub(crate) fn inverse(last: &[u8], primary: usize) -> Result<Vec<u8>, FormatError> {
    if primary >= last.len() {
        return Err(FormatError::InvalidBwtIndex {
            index: primary,
            len: last.len(),
        });
    }

    let mut starts = [0usize; 256];
    for &b in last {
        starts[b as usize] += 1;
    }
    let mut total = 0;
    for slot in starts.iter_mut() {
        let count = *slot;
        *slot = total;
        total += count;
    }

    let mut next = vec![0u32; last.len()];
    for (i, &b) in last.iter().enumerate() {
        let slot = &mut starts[b as usize];
        next[*slot] = i as u32;
        *slot += 1;
    }

    let mut out = Vec::with_capacity(last.len());
    let mut pos = next[primary] as usize;
    for _ in 0..last.len() {
        out.push(last[pos]);
        pos = next[pos] as usize;
    }
    Ok(out)
}
