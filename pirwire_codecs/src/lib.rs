pub mod bzip2;
mod passthrough;

pub use bzip2::{decompress, BlockSummary, Bzip2Codec, Bzip2Decoder};
pub use passthrough::PassThroughCodec;

use pirwire_core::format::{CODEC_BZIP2, CODEC_PASSTHROUGH};
use pirwire_core::Codec;
use std::sync::Arc;

/// Resolve a codec from the `codec_id` a client is configured with.
pub fn codec_by_id(id: u16) -> anyhow::Result<Arc<dyn Codec>> {
    match id {
        CODEC_PASSTHROUGH => Ok(Arc::new(PassThroughCodec)),
        CODEC_BZIP2 => Ok(Arc::new(Bzip2Codec)),
        _ => anyhow::bail!("unknown codec id {}; supported: 0 (passthrough), 1 (bzip2)", id),
    }
}
