use pirwire_core::codec::{Codec, DecodeOptions};
use pirwire_core::format::CODEC_PASSTHROUGH;
use pirwire_core::Result;

/// Codec for servers that return rows uncompressed.
///
/// Also handy for exercising the response pipeline without building
/// compressed fixtures.
pub struct PassThroughCodec;

impl Codec for PassThroughCodec {
    fn id(&self) -> u16 {
        CODEC_PASSTHROUGH
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn decompress(&self, compressed: &[u8], _opts: DecodeOptions) -> Result<Vec<u8>> {
        Ok(compressed.to_vec())
    }
}
