pub mod bloom;
pub mod bucket;
pub mod chunks;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod format;
pub mod frame;
pub mod primitive;
pub mod reader;
pub mod varint;
pub mod writer;

pub use bloom::BloomFilter;
pub use client::{Match, RetrievalClient};
pub use codec::{Codec, DecodeOptions};
pub use config::ClientConfig;
pub use error::{Error, FormatError, Result};
pub use format::StreamHeader;
pub use frame::{Metadata, Payload, Record};
pub use primitive::{Primitive, SetupResponse, Transport};
pub use reader::ResponseReader;
pub use writer::{QueryBatch, QueryWriter, WriteBatch};
