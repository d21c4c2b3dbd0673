use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::DecodeOptions;
use crate::error::{Error, Result};
use crate::format::{CODEC_BZIP2, DEFAULT_BATCH_SIZE};

/// Client-side knobs for the retrieval pipeline.
///
/// Every field has a default, so a config file only needs to name what it
/// changes:
///
/// ```json
/// { "batch_size": 8, "check_crc": false }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Queries per request batch. Must be greater than zero.
    pub batch_size: usize,
    /// Verify block and stream CRCs while decompressing responses.
    pub check_crc: bool,
    /// Key count below which intersection skips the membership filter and
    /// reads every key directly.
    pub bloom_cutoff: usize,
    /// Codec used to decode decrypted responses.
    pub codec_id: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            check_crc: true,
            bloom_cutoff: 0,
            codec_id: CODEC_BZIP2,
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be greater than zero".into()));
        }
        Ok(())
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            check_crc: self.check_crc,
        }
    }
}
