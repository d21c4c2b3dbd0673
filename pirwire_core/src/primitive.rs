//! Interfaces to the collaborators this crate does not implement: the
//! private-retrieval cryptography and the network transport.

use crate::bucket;
use crate::error::Result;

/// The private-retrieval scheme, consumed as a black box.
///
/// For every key the pipeline calls, in order: `row_index` and
/// `generate_query` when building the request, then `decrypt`, the codec,
/// and `extract_record` when processing the response.
pub trait Primitive: Send + Sync {
    /// log2 of the number of rows in the server database.
    fn row_bits(&self) -> u32;

    /// Row that holds `key`.
    fn row_index(&self, key: &[u8]) -> u64 {
        bucket::row_from_key(key, self.row_bits())
    }

    /// Public parameters uploaded once per session.
    fn public_parameters(&self) -> anyhow::Result<Vec<u8>>;

    /// Encrypted query for `row`.
    fn generate_query(&self, row: u64) -> anyhow::Result<Vec<u8>>;

    /// Decrypt one response chunk. `hint` is the blob the server handed out
    /// at setup, for schemes that need one.
    fn decrypt(&self, response: &[u8], hint: Option<&[u8]>) -> anyhow::Result<Vec<u8>>;

    /// Pull the record for `key` out of a decompressed row.
    fn extract_record(&self, key: &[u8], row: &[u8]) -> Result<Option<Vec<u8>>> {
        bucket::extract_from_bucket(key, row)
    }
}

/// What the server returns when a session is set up.
#[derive(Debug, Clone, Default)]
pub struct SetupResponse {
    pub session_id: String,
    pub hint: Option<Vec<u8>>,
}

/// Request/response plumbing to the server.
pub trait Transport: Send + Sync {
    /// Whether the server still knows `session_id`.
    fn check_session(&self, session_id: &str) -> anyhow::Result<bool>;

    /// Upload public parameters and open a session.
    fn setup(&self, public_parameters: Vec<u8>) -> anyhow::Result<SetupResponse>;

    /// Send one chunk batch of queries; returns the chunk batch of responses.
    fn private_read(&self, batch: Vec<u8>) -> anyhow::Result<Vec<u8>>;

    /// Fetch the bucket's membership filter bytes.
    fn membership_filter(&self) -> anyhow::Result<Vec<u8>>;

    /// Upload a write batch (concatenated wrapped key/value pairs).
    fn write(&self, body: Vec<u8>) -> anyhow::Result<()>;
}
