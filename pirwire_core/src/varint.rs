//! Unsigned LEB128 varints: 7 payload bits per byte, least-significant group
//! first, continuation flag in bit 7.
//!
//! The value range is capped at `MAX_SAFE_INTEGER` (2^53 - 1) so that every
//! varint this crate writes can also be read by clients whose integers are
//! IEEE doubles.

use crate::error::{Error, Result};

/// Largest value `encode` accepts.
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// Longest varint `decode` accepts. A ninth byte would need a shift of more
/// than 50 bits.
pub const MAX_VARINT_BYTES: usize = 8;

const MSB: u8 = 0x80;
const REST: u8 = 0x7F;

/// Encode `n` as a varint.
pub fn encode(n: u64) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(encoded_len(n));
    encode_into(n, &mut buf)?;
    Ok(buf)
}

/// Append the varint encoding of `n` to `buf`.
pub fn encode_into(mut n: u64, buf: &mut Vec<u8>) -> Result<()> {
    if n > MAX_SAFE_INTEGER {
        return Err(Error::encoding(format!(
            "cannot encode {} as varint: exceeds {}",
            n, MAX_SAFE_INTEGER
        )));
    }
    while n >= MSB as u64 {
        buf.push((n as u8 & REST) | MSB);
        n >>= 7;
    }
    buf.push(n as u8);
    Ok(())
}

/// Number of bytes `encode(n)` produces.
pub fn encoded_len(n: u64) -> usize {
    let significant = 64 - n.leading_zeros() as usize;
    significant.max(1).div_ceil(7)
}

/// Decode a varint from the front of `buf`.
///
/// Returns the value and the number of bytes consumed, so callers can locate
/// the next field.
pub fn decode(buf: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0u64;
    for (idx, &byte) in buf.iter().enumerate() {
        if idx >= MAX_VARINT_BYTES {
            break;
        }
        value |= ((byte & REST) as u64) << (7 * idx);
        if byte & MSB == 0 {
            return Ok((value, idx + 1));
        }
    }

    if buf.len() >= MAX_VARINT_BYTES {
        Err(Error::encoding(format!(
            "varint longer than {} bytes",
            MAX_VARINT_BYTES
        )))
    } else {
        Err(Error::encoding("varint runs past the end of the buffer"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use test_case::test_case;

    #[test_case(0; "zero")]
    #[test_case(1; "one")]
    #[test_case(100; "hundred")]
    #[test_case(127; "largest single byte")]
    #[test_case(128; "smallest two bytes")]
    #[test_case(1000; "thousand")]
    #[test_case(12_345_678; "eight digits")]
    #[test_case((1 << 32) - 1; "u32 max")]
    #[test_case(1 << 32; "two pow 32")]
    #[test_case(1 << 50; "two pow 50")]
    #[test_case(MAX_SAFE_INTEGER; "max safe")]
    fn encode_then_decode(n: u64) {
        let bytes = encode(n).unwrap();
        assert_eq!(bytes.len(), encoded_len(n));
        assert_eq!(decode(&bytes).unwrap(), (n, bytes.len()));
    }

    #[test]
    fn random_values_up_to_max_safe() {
        let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
        for _ in 0..10_000 {
            let n = rng.random_range(0..=MAX_SAFE_INTEGER);
            let bytes = encode(n).unwrap();
            assert_eq!(decode(&bytes).unwrap(), (n, bytes.len()), "n = {n}");
        }
    }

    #[test]
    fn known_encodings() {
        assert_eq!(encode(0).unwrap(), [0x00]);
        assert_eq!(encode(127).unwrap(), [0x7F]);
        assert_eq!(encode(128).unwrap(), [0x80, 0x01]);
        assert_eq!(encode(300).unwrap(), [0xAC, 0x02]);
    }

    #[test]
    fn above_max_safe_is_rejected() {
        assert!(matches!(encode(MAX_SAFE_INTEGER + 1), Err(Error::Encoding(_))));
        assert!(matches!(encode(u64::MAX), Err(Error::Encoding(_))));
    }

    #[test]
    fn decode_reports_consumed_bytes_only() {
        let mut buf = encode(12_345_678).unwrap();
        let len = buf.len();
        buf.extend_from_slice(b"trailing field");
        assert_eq!(decode(&buf).unwrap(), (12_345_678, len));
    }

    #[test]
    fn decode_rejects_truncated() {
        assert!(matches!(decode(&[]), Err(Error::Encoding(_))));
        assert!(matches!(decode(&[0x80, 0x80]), Err(Error::Encoding(_))));
    }

    #[test]
    fn decode_rejects_overlong() {
        let overlong = [0xFFu8; 9];
        assert!(matches!(decode(&overlong), Err(Error::Encoding(_))));

        // Eight bytes is the longest accepted form.
        let mut eight = [0xFFu8; 8];
        eight[7] = 0x7F;
        assert_eq!(decode(&eight).unwrap(), ((1u64 << 56) - 1, 8));
    }
}
