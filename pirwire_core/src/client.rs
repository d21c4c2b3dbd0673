use std::sync::{Arc, OnceLock};

use tracing::{debug, info};

use crate::bloom::BloomFilter;
use crate::codec::Codec;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::frame::{Payload, Record};
use crate::primitive::{Primitive, Transport};
use crate::reader::ResponseReader;
use crate::writer::{QueryWriter, WriteBatch};

#[derive(Debug)]
struct Session {
    id: String,
    hint: Option<Vec<u8>>,
}

/// A key that survived a private intersection, with its value when values
/// were requested.
#[derive(Debug, Clone, PartialEq)]
pub struct Match<'a, K> {
    pub key: &'a K,
    pub value: Option<Payload>,
}

/// Client for one remote bucket.
///
/// Reads go key → row → encrypted query → chunk batch → transport, and back
/// through a [`ResponseReader`]. The session is opened at most once; every
/// read after that reuses its id and hint.
pub struct RetrievalClient {
    config: ClientConfig,
    primitive: Arc<dyn Primitive>,
    transport: Arc<dyn Transport>,
    reader: ResponseReader,
    session: OnceLock<Session>,
}

impl RetrievalClient {
    pub fn new(
        config: ClientConfig,
        codec: Arc<dyn Codec>,
        primitive: Arc<dyn Primitive>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        if codec.id() != config.codec_id {
            return Err(Error::Config(format!(
                "config selects codec {} but codec '{}' has id {}",
                config.codec_id,
                codec.name(),
                codec.id()
            )));
        }
        let reader = ResponseReader::new(codec, Arc::clone(&primitive), config.decode_options());
        Ok(Self {
            config,
            primitive,
            transport,
            reader,
            session: OnceLock::new(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Id of the open session.
    pub fn session_id(&self) -> Result<&str> {
        self.session.get().map(|s| s.id.as_str()).ok_or(Error::NeedSetup)
    }

    /// Open a session, reusing `existing` when the server still knows it.
    ///
    /// A no-op once a session is open. Otherwise uploads fresh public
    /// parameters, which can be several megabytes.
    pub fn setup(&self, existing: Option<&str>) -> Result<&str> {
        if let Some(session) = self.session.get() {
            return Ok(&session.id);
        }

        let session = match existing {
            Some(id) if self.transport.check_session(id)? => {
                debug!(session = id, "reusing session");
                Session {
                    id: id.to_string(),
                    hint: None,
                }
            }
            _ => {
                let params = self.primitive.public_parameters()?;
                let bytes = params.len();
                let resp = self.transport.setup(params)?;
                info!(session = %resp.session_id, bytes, "opened session");
                Session {
                    id: resp.session_id,
                    hint: resp.hint,
                }
            }
        };
        // A concurrent setup may have won; its session is kept.
        let _ = self.session.set(session);
        self.session_id()
    }

    /// Privately read one key's value.
    pub fn private_read(&self, key: &[u8]) -> Result<Option<Payload>> {
        Ok(self.private_read_with_metadata(key)?.map(|r| r.data))
    }

    /// Privately read one key's value along with its header fields.
    pub fn private_read_with_metadata(&self, key: &[u8]) -> Result<Option<Record>> {
        Ok(self.private_read_many(&[key])?.pop().flatten())
    }

    /// Privately read every key. Results are in key order; a key with no
    /// record, or whose record failed to decode, yields `None`.
    pub fn private_read_many<K>(&self, keys: &[K]) -> Result<Vec<Option<Record>>>
    where
        K: AsRef<[u8]> + Sync,
    {
        if self.session.get().is_none() {
            self.setup(None)?;
        }
        let session = self.session.get().ok_or(Error::NeedSetup)?;

        let mut writer = QueryWriter::new(session.id.as_bytes(), self.config.batch_size)?;
        for key in keys {
            let row = self.primitive.row_index(key.as_ref());
            let query = self.primitive.generate_query(row)?;
            writer.push(&query);
        }

        let mut records = Vec::with_capacity(keys.len());
        let mut offset = 0;
        for batch in writer.finish() {
            let batch_keys = &keys[offset..offset + batch.len];
            offset += batch.len;
            let response = self.transport.private_read(batch.body)?;
            records.extend(self.reader.read_batch(batch_keys, &response, session.hint.as_deref())?);
        }
        Ok(records)
    }

    /// Fetch and parse the bucket's membership filter.
    pub fn membership_filter(&self) -> Result<BloomFilter> {
        let raw = self.transport.membership_filter()?;
        let filter = BloomFilter::from_bytes(&raw)?;
        debug!(k = filter.k(), bits = filter.bits(), set = filter.count_ones(), "fetched membership filter");
        Ok(filter)
    }

    /// Keys of `keys` present in the bucket, with their values when
    /// `retrieve_values` is set.
    ///
    /// Below `bloom_cutoff` keys every key is read directly and only hits are
    /// kept. Otherwise the membership filter narrows the set first, so a
    /// filter false positive can surface as a match with no value.
    pub fn private_intersect<'a, K>(&self, keys: &'a [K], retrieve_values: bool) -> Result<Vec<Match<'a, K>>>
    where
        K: AsRef<[u8]> + Sync,
    {
        if keys.len() < self.config.bloom_cutoff {
            return self.read_hits(keys.iter().collect());
        }

        let candidates = self.membership_filter()?.intersect(keys);
        debug!(candidates = candidates.len(), keys = keys.len(), "filtered intersection candidates");
        if !retrieve_values {
            return Ok(candidates.into_iter().map(|key| Match { key, value: None }).collect());
        }

        let records = self.private_read_many(&candidates)?;
        Ok(candidates
            .into_iter()
            .zip(records)
            .map(|(key, record)| Match {
                key,
                value: record.map(|r| r.data),
            })
            .collect())
    }

    /// Keys of `keys` present in the bucket.
    pub fn private_key_intersect<'a, K>(&self, keys: &'a [K]) -> Result<Vec<&'a K>>
    where
        K: AsRef<[u8]> + Sync,
    {
        if keys.len() < self.config.bloom_cutoff {
            let hits = self.read_hits(keys.iter().collect())?;
            return Ok(hits.into_iter().map(|m| m.key).collect());
        }
        Ok(self.membership_filter()?.intersect(keys))
    }

    fn read_hits<'a, K>(&self, keys: Vec<&'a K>) -> Result<Vec<Match<'a, K>>>
    where
        K: AsRef<[u8]> + Sync,
    {
        let records = self.private_read_many(&keys)?;
        Ok(keys
            .into_iter()
            .zip(records)
            .filter_map(|(key, record)| {
                record.map(|r| Match {
                    key,
                    value: Some(r.data),
                })
            })
            .collect())
    }

    /// Start a batch of records to upload with [`write`](Self::write).
    pub fn write_batch(&self) -> WriteBatch {
        WriteBatch::new()
    }

    pub fn write(&self, batch: WriteBatch) -> Result<()> {
        let count = batch.len();
        self.transport.write(batch.finish())?;
        debug!(records = count, "uploaded write batch");
        Ok(())
    }
}
