//! Record and key/value framing.
//!
//! A record is a header followed by a payload:
//!
//! ```text
//! varint(0)                         -> no header, rest is raw bytes
//! varint(n) | n bytes of JSON header | payload
//! ```
//!
//! The JSON header always carries `contentType`; the payload is JSON-decoded
//! when `contentType == "application/json"` and passed through otherwise.
//!
//! A key/value pair is wrapped as `varint(len(key)) | key | varint(len(value)) | value`.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::varint;

pub const CONTENT_TYPE: &str = "contentType";
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_BYTES: &str = "application/octet-stream";

/// Header fields attached to a record.
pub type Metadata = Map<String, Value>;

/// The application value carried by a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(v) => Some(v),
            Payload::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Bytes(b) => Some(b),
            Payload::Json(_) => None,
        }
    }
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self {
        Payload::Json(v)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Payload::Bytes(b)
    }
}

impl From<&[u8]> for Payload {
    fn from(b: &[u8]) -> Self {
        Payload::Bytes(b.to_vec())
    }
}

/// A decoded record: its payload and, when the record had a header, the
/// header fields (including `contentType`).
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub data: Payload,
    pub metadata: Option<Metadata>,
}

/// Frame `payload` with an optional metadata header.
///
/// Raw bytes without metadata get the `varint(0)` "no header" marker. In every
/// other case the header is emitted, and its `contentType` is derived from the
/// payload kind; a caller-supplied `contentType` is overwritten so the record
/// always decodes back to the same payload kind.
pub fn serialize(payload: &Payload, metadata: Option<&Metadata>) -> Result<Vec<u8>> {
    let has_metadata = metadata.is_some_and(|m| !m.is_empty());

    let body = match payload {
        Payload::Bytes(b) if !has_metadata => {
            let mut out = Vec::with_capacity(1 + b.len());
            varint::encode_into(0, &mut out)?;
            out.extend_from_slice(b);
            return Ok(out);
        }
        Payload::Bytes(b) => b.clone(),
        Payload::Json(v) => serde_json::to_vec(v)?,
    };

    let content_type = match payload {
        Payload::Json(_) => CONTENT_TYPE_JSON,
        Payload::Bytes(_) => CONTENT_TYPE_BYTES,
    };

    let mut header = metadata.cloned().unwrap_or_default();
    header.insert(CONTENT_TYPE.to_string(), Value::from(content_type));
    let header_bytes = serde_json::to_vec(&header)?;

    let mut out = Vec::with_capacity(varint::MAX_VARINT_BYTES + header_bytes.len() + body.len());
    varint::encode_into(header_bytes.len() as u64, &mut out)?;
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Frame any serde-serializable value as a JSON record.
///
/// Values that have no JSON form (maps with non-string keys, `Serialize` impls
/// that fail) are rejected with `Error::Encoding`.
pub fn serialize_value<T: Serialize + ?Sized>(value: &T, metadata: Option<&Metadata>) -> Result<Vec<u8>> {
    let json = serde_json::to_value(value)
        .map_err(|e| Error::encoding(format!("value has no JSON representation: {}", e)))?;
    serialize(&Payload::Json(json), metadata)
}

/// Inverse of [`serialize`].
pub fn deserialize(bytes: &[u8]) -> Result<Record> {
    let (header, payload) = split_header(bytes)?;
    if header.is_empty() {
        return Ok(Record {
            data: Payload::Bytes(payload.to_vec()),
            metadata: None,
        });
    }

    let metadata: Metadata = serde_json::from_slice(header)?;
    let is_json = metadata
        .get(CONTENT_TYPE)
        .and_then(Value::as_str)
        .is_some_and(|ct| ct == CONTENT_TYPE_JSON);

    let data = if is_json {
        Payload::Json(serde_json::from_slice(payload)?)
    } else {
        Payload::Bytes(payload.to_vec())
    };

    Ok(Record {
        data,
        metadata: Some(metadata),
    })
}

/// Split a record into its raw header bytes and its payload without parsing
/// the header. A record with no header yields an empty header slice.
pub fn split_header(bytes: &[u8]) -> Result<(&[u8], &[u8])> {
    let (header_len, used) = varint::decode(bytes)?;
    let rest = &bytes[used..];
    let header_len = usize::try_from(header_len)
        .map_err(|_| Error::encoding("header length does not fit in memory"))?;
    if header_len > rest.len() {
        return Err(Error::encoding(format!(
            "header declares {} bytes but only {} remain",
            header_len,
            rest.len()
        )));
    }
    Ok(rest.split_at(header_len))
}

/// Wrap a key and value into one length-prefixed byte sequence.
pub fn wrap_key_value(key: &[u8], value: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(2 * varint::MAX_VARINT_BYTES + key.len() + value.len());
    wrap_key_value_into(key, value, &mut out)?;
    Ok(out)
}

/// Append the wrapped key/value pair to `out`.
pub fn wrap_key_value_into(key: &[u8], value: &[u8], out: &mut Vec<u8>) -> Result<()> {
    varint::encode_into(key.len() as u64, out)?;
    out.extend_from_slice(key);
    varint::encode_into(value.len() as u64, out)?;
    out.extend_from_slice(value);
    Ok(())
}

/// Read one wrapped key/value pair from the front of `bytes`.
///
/// Returns `(key, value, consumed)`.
pub fn unwrap_key_value(bytes: &[u8]) -> Result<(&[u8], &[u8], usize)> {
    let (key, after_key) = take_prefixed(bytes, "key")?;
    let (value, after_value) = take_prefixed(&bytes[after_key..], "value")?;
    Ok((key, value, after_key + after_value))
}

fn take_prefixed<'a>(bytes: &'a [u8], field: &str) -> Result<(&'a [u8], usize)> {
    let (len, used) = varint::decode(bytes)?;
    let len = usize::try_from(len).map_err(|_| Error::encoding(format!("{} length does not fit in memory", field)))?;
    let end = used
        .checked_add(len)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| {
            Error::encoding(format!(
                "{} declares {} bytes but only {} remain",
                field,
                len,
                bytes.len() - used
            ))
        })?;
    Ok((&bytes[used..end], end))
}

/// Iterator over a concatenation of wrapped key/value pairs.
///
/// Stops after the first malformed pair.
pub struct KeyValueIter<'a> {
    rest: &'a [u8],
    failed: bool,
}

impl<'a> KeyValueIter<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            rest: bytes,
            failed: false,
        }
    }
}

impl<'a> Iterator for KeyValueIter<'a> {
    type Item = Result<(&'a [u8], &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.rest.is_empty() {
            return None;
        }
        match unwrap_key_value(self.rest) {
            Ok((key, value, used)) => {
                self.rest = &self.rest[used..];
                Some(Ok((key, value)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
