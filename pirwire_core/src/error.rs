use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every way a pirwire operation can fail.
///
/// A membership miss or a record that is not present in a bucket is not an
/// error; those surface as `false` / `None` at the call site.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed compressed stream header or block structure.
    #[error("malformed compressed stream: {0}")]
    Format(#[from] FormatError),

    /// A block (or the whole stream) decoded to bytes whose CRC-32 does not
    /// match the stored value.
    #[error("crc mismatch: stored {expected:08x}, computed {actual:08x}")]
    Integrity { expected: u32, actual: u32 },

    /// Varint overflow, truncated frame, or a value that cannot be framed.
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Membership filter bytes or parameters are inconsistent.
    #[error("invalid membership filter: {0}")]
    Filter(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// The client has no session identifier yet.
    #[error("client must be set up before private reads")]
    NeedSetup,

    /// Failure reported by an external collaborator (cryptographic primitive
    /// or transport).
    #[error(transparent)]
    External(#[from] anyhow::Error),
}

impl Error {
    pub fn encoding(msg: impl Into<String>) -> Self {
        Error::Encoding(msg.into())
    }

    pub fn filter(msg: impl Into<String>) -> Self {
        Error::Filter(msg.into())
    }
}

/// Structural violations found while decoding a compressed block stream.
///
/// All of these are fatal for the stream being decoded: no partial output is
/// ever returned alongside one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("invalid magic {0:#06x}")]
    BadMagic(u16),

    #[error("invalid method {0:#04x}, expected Huffman")]
    BadMethod(u8),

    #[error("invalid block size digit {0:#04x}")]
    BadBlockSize(u8),

    #[error("invalid block tag {0:#014x}")]
    BadBlockTag(u64),

    #[error("randomised blocks are not supported")]
    Randomized,

    #[error("invalid number of huffman groups: {0}")]
    BadGroupCount(u8),

    #[error("block declares zero selectors")]
    NoSelectors,

    #[error("MTF table out of range: index {index} with {groups} groups")]
    MtfOutOfRange { index: usize, groups: usize },

    #[error("huffman group length outside range: {0}")]
    HuffmanLengthOutOfRange(i32),

    #[error("bit sequence does not match any huffman code")]
    InvalidHuffmanCode,

    #[error("symbol stream ran past the last selector")]
    SelectorsExhausted,

    #[error("block exceeds {limit} bytes")]
    BlockTooLarge { limit: usize },

    #[error("BWT primary index {index} out of bounds for block of {len} bytes")]
    InvalidBwtIndex { index: usize, len: usize },

    #[error("block contains no symbols")]
    EmptyBlock,

    #[error("stream ended before the end-of-stream marker")]
    Truncated,
}
