use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::chunks::deserialize_chunks;
use crate::codec::{Codec, DecodeOptions};
use crate::error::{Error, Result};
use crate::frame::{self, Record};
use crate::primitive::Primitive;

/// Turns encrypted response chunks back into records.
///
/// # Per-key pipeline
/// 1. `Primitive::decrypt` the chunk. An all-zero plaintext is an empty row.
/// 2. Decompress the row with the configured [`Codec`].
/// 3. `Primitive::extract_record` picks the key's record out of the row.
/// 4. [`frame::deserialize`] the record.
///
/// Steps never share buffers between keys, so a batch is decoded in
/// parallel and a failure in one key's pipeline cannot touch another's.
pub struct ResponseReader {
    codec: Arc<dyn Codec>,
    primitive: Arc<dyn Primitive>,
    opts: DecodeOptions,
}

impl ResponseReader {
    pub fn new(codec: Arc<dyn Codec>, primitive: Arc<dyn Primitive>, opts: DecodeOptions) -> Self {
        Self {
            codec,
            primitive,
            opts,
        }
    }

    pub fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    /// Decrypt and decompress one response chunk into its row bytes.
    ///
    /// Returns `Ok(None)` when the server returned an empty row.
    pub fn decode_row(&self, encrypted: &[u8], hint: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        let compressed = self.primitive.decrypt(encrypted, hint)?;
        if compressed.iter().all(|&b| b == 0) {
            return Ok(None);
        }
        let row = self.codec.decompress(&compressed, self.opts)?;
        Ok(Some(row))
    }

    /// Run the full pipeline for one key.
    pub fn read_record(&self, key: &[u8], encrypted: &[u8], hint: Option<&[u8]>) -> Result<Option<Record>> {
        let Some(row) = self.decode_row(encrypted, hint)? else {
            return Ok(None);
        };
        match self.primitive.extract_record(key, &row)? {
            Some(record) => Ok(Some(frame::deserialize(&record)?)),
            None => Ok(None),
        }
    }

    /// Decode a chunk-batch response to the queries for `keys`.
    ///
    /// Results come back in key order. A key whose pipeline fails is logged
    /// and yields `None`; only a response whose chunk count does not match
    /// `keys` fails the whole batch.
    pub fn read_batch<K>(&self, keys: &[K], response: &[u8], hint: Option<&[u8]>) -> Result<Vec<Option<Record>>>
    where
        K: AsRef<[u8]> + Sync,
    {
        let chunks = deserialize_chunks(response)?;
        if chunks.len() != keys.len() {
            return Err(Error::encoding(format!(
                "response carries {} chunks for {} queries",
                chunks.len(),
                keys.len()
            )));
        }
        debug!(keys = keys.len(), bytes = response.len(), "decoding response batch");

        let records = keys
            .par_iter()
            .zip(chunks.par_iter())
            .map(|(key, chunk)| {
                let key = key.as_ref();
                self.read_record(key, chunk, hint).unwrap_or_else(|e| {
                    warn!(key = %String::from_utf8_lossy(key), error = %e, "dropping undecodable record");
                    None
                })
            })
            .collect();
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::encode_bucket;
    use crate::chunks::serialize_chunks;
    use crate::frame::Payload;
    use serde_json::json;

    /// Codec that returns its input.
    struct Identity;

    impl Codec for Identity {
        fn id(&self) -> u16 {
            0
        }
        fn name(&self) -> &'static str {
            "identity"
        }
        fn decompress(&self, compressed: &[u8], _opts: DecodeOptions) -> Result<Vec<u8>> {
            Ok(compressed.to_vec())
        }
    }

    /// "Decrypts" by dropping a one-byte tag; tag 0xFF fails.
    struct Tagged;

    impl Primitive for Tagged {
        fn row_bits(&self) -> u32 {
            4
        }
        fn public_parameters(&self) -> anyhow::Result<Vec<u8>> {
            Ok(Vec::new())
        }
        fn generate_query(&self, row: u64) -> anyhow::Result<Vec<u8>> {
            Ok(row.to_le_bytes().to_vec())
        }
        fn decrypt(&self, response: &[u8], _hint: Option<&[u8]>) -> anyhow::Result<Vec<u8>> {
            match response.split_first() {
                Some((0xFF, _)) => anyhow::bail!("bad ciphertext"),
                Some((_, rest)) => Ok(rest.to_vec()),
                None => Ok(Vec::new()),
            }
        }
    }

    fn reader() -> ResponseReader {
        ResponseReader::new(Arc::new(Identity), Arc::new(Tagged), DecodeOptions::default())
    }

    fn encrypted_bucket() -> Vec<u8> {
        let alpha = frame::serialize(&Payload::Json(json!({"n": 1})), None).unwrap();
        let mut out = vec![0x01];
        out.extend(encode_bucket(8, &[("alpha", alpha)]).unwrap());
        out
    }

    #[test]
    fn reads_record_through_pipeline() {
        let record = reader().read_record(b"alpha", &encrypted_bucket(), None).unwrap().unwrap();
        assert_eq!(record.data, Payload::Json(json!({"n": 1})));
        assert_eq!(reader().read_record(b"bravo", &encrypted_bucket(), None).unwrap(), None);
    }

    #[test]
    fn all_zero_plaintext_is_an_empty_row() {
        assert_eq!(reader().read_record(b"alpha", &[0x01, 0, 0, 0, 0], None).unwrap(), None);
    }

    #[test]
    fn decrypt_failure_is_external_error() {
        assert!(matches!(
            reader().read_record(b"alpha", &[0xFF, 1], None),
            Err(Error::External(_))
        ));
    }

    #[test]
    fn one_bad_chunk_does_not_sink_the_batch() {
        let response = serialize_chunks(&[encrypted_bucket(), vec![0xFF, 9], encrypted_bucket()]);
        let records = reader().read_batch(&["alpha", "alpha", "nobody"], &response, None).unwrap();
        assert!(records[0].is_some());
        assert!(records[1].is_none());
        assert!(records[2].is_none());
    }

    #[test]
    fn chunk_count_mismatch_fails_the_batch() {
        let response = serialize_chunks(&[encrypted_bucket()]);
        assert!(matches!(
            reader().read_batch(&["alpha", "bravo"], &response, None),
            Err(Error::Encoding(_))
        ));
    }
}
