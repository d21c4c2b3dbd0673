use crate::error::FormatError;

/// Stream signature: the two ASCII characters "BZ".
pub const STREAM_MAGIC: u16 = 0x425A;

/// Entropy coding method byte: 'h' for Huffman.
pub const METHOD_HUFFMAN: u8 = 0x68;

/// Block-size digits are ASCII '1'..='9'.
pub const BLOCK_SIZE_DIGIT_MIN: u8 = b'1';
pub const BLOCK_SIZE_DIGIT_MAX: u8 = b'9';

/// Uncompressed bytes per unit of the block-size digit. A block's
/// BWT buffer never exceeds `digit * BLOCK_SIZE_UNIT` bytes.
pub const BLOCK_SIZE_UNIT: usize = 100_000;

/// Size of the stream header in bytes: magic:u16 + method:u8 + digit:u8.
pub const STREAM_HEADER_SIZE: usize = 4;

// ── Block tags ─────────────────────────────────────────────────────────────

/// 48-bit tag that opens a compressed block (BCD digits of pi).
pub const BLOCK_TAG_COMPRESSED: u64 = 0x3141_5926_5359;

/// 48-bit tag that marks the end of the stream (BCD digits of sqrt(pi)).
pub const BLOCK_TAG_END_OF_STREAM: u64 = 0x1772_4538_5090;

// ── Membership filter ──────────────────────────────────────────────────────

/// k:u32 LE + bits:u32 LE
pub const FILTER_HEADER_SIZE: usize = 8;

/// Accepted range of the filter size exponent.
pub const FILTER_BITS_MIN: u32 = 3;
pub const FILTER_BITS_MAX: u32 = 32;

// ── Chunk batches ──────────────────────────────────────────────────────────

/// Width of the count and per-chunk length fields (u64 LE).
pub const CHUNK_LEN_FIELD_SIZE: usize = 8;

/// Default number of queries sent per batch.
pub const DEFAULT_BATCH_SIZE: usize = 5;

// ── Codec IDs ──────────────────────────────────────────────────────────────

pub const CODEC_PASSTHROUGH: u16 = 0;
pub const CODEC_BZIP2: u16 = 1;

// ── Stream header ──────────────────────────────────────────────────────────

/// Decoded representation of the 4-byte stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// Block-size digit as a number in `1..=9`.
    pub level: u8,
}

impl StreamHeader {
    /// Largest BWT buffer a block in this stream may carry.
    pub fn max_block_len(&self) -> usize {
        self.level as usize * BLOCK_SIZE_UNIT
    }

    /// Serialize to exactly `STREAM_HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; STREAM_HEADER_SIZE] {
        let mut buf = [0u8; STREAM_HEADER_SIZE];
        buf[..2].copy_from_slice(&STREAM_MAGIC.to_be_bytes());
        buf[2] = METHOD_HUFFMAN;
        buf[3] = b'0' + self.level;
        buf
    }

    /// Validate the magic, method, and block-size digit.
    pub fn from_bytes(buf: &[u8; STREAM_HEADER_SIZE]) -> Result<Self, FormatError> {
        let magic = u16::from_be_bytes([buf[0], buf[1]]);
        Self::from_fields(magic, buf[2], buf[3])
    }

    /// Validate header fields that were read individually from a bit stream.
    pub fn from_fields(magic: u16, method: u8, digit: u8) -> Result<Self, FormatError> {
        if magic != STREAM_MAGIC {
            return Err(FormatError::BadMagic(magic));
        }
        if method != METHOD_HUFFMAN {
            return Err(FormatError::BadMethod(method));
        }
        if !(BLOCK_SIZE_DIGIT_MIN..=BLOCK_SIZE_DIGIT_MAX).contains(&digit) {
            return Err(FormatError::BadBlockSize(digit));
        }
        Ok(Self {
            level: digit - b'0',
        })
    }
}
