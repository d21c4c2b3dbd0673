use serde::Serialize;
use tracing::debug;

use crate::chunks::serialize_chunks;
use crate::error::{Error, Result};
use crate::frame::{self, Metadata, Payload};

/// One request body ready for the transport, with the number of queries it
/// carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryBatch {
    pub body: Vec<u8>,
    pub len: usize,
}

/// Buffers encrypted queries and cuts them into chunk batches.
///
/// # Write contract
/// Call [`push`](Self::push) once per key, in key order. Every time
/// `batch_size` queries are pending they are sealed into one batch. Call
/// [`finish`](Self::finish) to seal the partial tail batch and take all
/// batches in order.
///
/// Each chunk is `session_id ++ query`, so the server can find the public
/// parameters that query was encrypted under.
pub struct QueryWriter {
    session_id: Vec<u8>,
    batch_size: usize,
    /// Chunks not yet sealed into a batch.
    pending: Vec<Vec<u8>>,
    batches: Vec<QueryBatch>,
}

impl QueryWriter {
    pub fn new(session_id: impl Into<Vec<u8>>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::Config("batch_size must be greater than zero".into()));
        }
        Ok(Self {
            session_id: session_id.into(),
            batch_size,
            pending: Vec::with_capacity(batch_size),
            batches: Vec::new(),
        })
    }

    /// Queue one encrypted query and seal a batch if it is now full.
    pub fn push(&mut self, query: &[u8]) {
        let mut chunk = Vec::with_capacity(self.session_id.len() + query.len());
        chunk.extend_from_slice(&self.session_id);
        chunk.extend_from_slice(query);
        self.pending.push(chunk);

        if self.pending.len() == self.batch_size {
            self.seal();
        }
    }

    fn seal(&mut self) {
        let chunks = std::mem::take(&mut self.pending);
        let body = serialize_chunks(&chunks);
        debug!(queries = chunks.len(), bytes = body.len(), "sealed query batch");
        self.batches.push(QueryBatch {
            body,
            len: chunks.len(),
        });
    }

    /// Seal any partial trailing batch and return every batch in order.
    pub fn finish(mut self) -> Vec<QueryBatch> {
        if !self.pending.is_empty() {
            self.seal();
        }
        self.batches
    }
}

/// Builds the upload body for a write: wrapped `key | serialize(value)`
/// pairs, concatenated.
#[derive(Debug, Default)]
pub struct WriteBatch {
    body: Vec<u8>,
    count: usize,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record for `key`.
    pub fn insert(&mut self, key: &[u8], payload: &Payload, metadata: Option<&Metadata>) -> Result<()> {
        let value = frame::serialize(payload, metadata)?;
        frame::wrap_key_value_into(key, &value, &mut self.body)?;
        self.count += 1;
        Ok(())
    }

    /// Add any serde-serializable value as a JSON record for `key`.
    pub fn insert_value<T: Serialize + ?Sized>(
        &mut self,
        key: &[u8],
        value: &T,
        metadata: Option<&Metadata>,
    ) -> Result<()> {
        let value = frame::serialize_value(value, metadata)?;
        frame::wrap_key_value_into(key, &value, &mut self.body)?;
        self.count += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn finish(self) -> Vec<u8> {
        self.body
    }
}
