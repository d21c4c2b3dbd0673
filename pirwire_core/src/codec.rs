use crate::error::Result;

/// Decoding options passed to a codec per call.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Verify stored checksums when the format carries them.
    pub check_crc: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self { check_crc: true }
    }
}

/// Turns a decrypted response body back into the bucket bytes it was
/// compressed from.
///
/// Each `Codec` implementation:
/// - Is identified by a stable numeric `id()` that clients pick from their
///   configuration.
/// - Holds no state between calls, so one instance can decode many responses
///   concurrently.
/// - Either returns the complete decoded output or an error; partial output
///   is never returned.
pub trait Codec: Send + Sync {
    /// Stable codec ID.
    fn id(&self) -> u16;

    /// Human-readable codec name for CLI display.
    fn name(&self) -> &'static str;

    /// Decode one complete response body.
    fn decompress(&self, compressed: &[u8], opts: DecodeOptions) -> Result<Vec<u8>>;
}
