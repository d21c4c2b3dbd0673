/// End-to-end tests of the retrieval client against an in-memory server.
///
/// The server answers every query with `tests/fixtures/bucket.bz2`, a
/// compressed bucket holding four records:
///
/// | key       | payload                              | metadata              |
/// |-----------|--------------------------------------|-----------------------|
/// | `alpha`   | JSON `{"color":"red","count":3}`     | `owner: ops`          |
/// | `bravo`   | bytes `00 01 02 "binary"`            | none (headerless)     |
/// | `charlie` | JSON `"just a string"`               | none                  |
/// | `delta`   | bytes `de ad be ef`                  | `source: sensor-7`    |
///
/// Selected rows are overridden to return a corrupt stream or an empty row.
/// "Encryption" is the identity; queries carry the row index as u64 LE.
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pirwire_codecs::{Bzip2Codec, PassThroughCodec};
use pirwire_core::bucket::row_from_key;
use pirwire_core::chunks::{deserialize_chunks, serialize_chunks};
use pirwire_core::frame::{KeyValueIter, CONTENT_TYPE, CONTENT_TYPE_BYTES};
use pirwire_core::{
    BloomFilter, ClientConfig, Error, Payload, Primitive, RetrievalClient, SetupResponse, Transport,
};
use serde_json::json;

const ROW_BITS: u32 = 20;
const SESSION: &str = "sess-1";
const HINT: &[u8] = b"hint-blob";

fn fixture(name: &str) -> Vec<u8> {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("reading {}: {}", path.display(), e))
}

fn row(key: &str) -> u64 {
    row_from_key(key.as_bytes(), ROW_BITS)
}

// ── mock collaborators ─────────────────────────────────────────────────────

struct MockPrimitive;

impl Primitive for MockPrimitive {
    fn row_bits(&self) -> u32 {
        ROW_BITS
    }

    fn public_parameters(&self) -> anyhow::Result<Vec<u8>> {
        Ok(vec![0xAA; 64])
    }

    fn generate_query(&self, row: u64) -> anyhow::Result<Vec<u8>> {
        Ok(row.to_le_bytes().to_vec())
    }

    fn decrypt(&self, response: &[u8], hint: Option<&[u8]>) -> anyhow::Result<Vec<u8>> {
        if let Some(hint) = hint {
            anyhow::ensure!(hint == HINT, "unexpected hint");
        }
        Ok(response.to_vec())
    }
}

struct MockTransport {
    default_row: Vec<u8>,
    overrides: HashMap<u64, Vec<u8>>,
    filter: Vec<u8>,
    setups: AtomicUsize,
    filter_fetches: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
    writes: Mutex<Vec<Vec<u8>>>,
}

impl MockTransport {
    fn new() -> Self {
        let bucket = fixture("bucket.bz2");
        let mut corrupt = bucket.clone();
        corrupt[40] ^= 0x10;

        let mut overrides = HashMap::new();
        overrides.insert(row("echo"), corrupt);
        overrides.insert(row("foxtrot"), vec![0u8; 32]);

        let mut filter = BloomFilter::new(8, 18).unwrap();
        filter.insert_all(["alpha", "bravo", "charlie", "delta"]);

        Self {
            default_row: bucket,
            overrides,
            filter: filter.to_bytes(),
            setups: AtomicUsize::new(0),
            filter_fetches: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
        }
    }
}

impl Transport for MockTransport {
    fn check_session(&self, session_id: &str) -> anyhow::Result<bool> {
        Ok(session_id == "known")
    }

    fn setup(&self, public_parameters: Vec<u8>) -> anyhow::Result<SetupResponse> {
        anyhow::ensure!(public_parameters.len() == 64, "bad public parameters");
        self.setups.fetch_add(1, Ordering::SeqCst);
        Ok(SetupResponse {
            session_id: SESSION.to_string(),
            hint: Some(HINT.to_vec()),
        })
    }

    fn private_read(&self, batch: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        let queries = deserialize_chunks(&batch)?;
        self.batch_sizes.lock().unwrap().push(queries.len());

        let mut responses = Vec::with_capacity(queries.len());
        for query in queries {
            let rest = query
                .strip_prefix(SESSION.as_bytes())
                .or_else(|| query.strip_prefix(b"known".as_slice()))
                .ok_or_else(|| anyhow::anyhow!("query without session prefix"))?;
            let row = u64::from_le_bytes(rest.try_into()?);
            let body = self.overrides.get(&row).unwrap_or(&self.default_row);
            responses.push(body.clone());
        }
        Ok(serialize_chunks(&responses))
    }

    fn membership_filter(&self) -> anyhow::Result<Vec<u8>> {
        self.filter_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.filter.clone())
    }

    fn write(&self, body: Vec<u8>) -> anyhow::Result<()> {
        self.writes.lock().unwrap().push(body);
        Ok(())
    }
}

fn mock_client_with(config: ClientConfig) -> (RetrievalClient, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new());
    let client = RetrievalClient::new(
        config,
        Arc::new(Bzip2Codec),
        Arc::new(MockPrimitive),
        transport.clone(),
    )
    .unwrap();
    (client, transport)
}

fn mock_client() -> (RetrievalClient, Arc<MockTransport>) {
    mock_client_with(ClientConfig::default())
}

// ── tests ──────────────────────────────────────────────────────────────────

#[test]
fn test_private_read_decodes_every_record_kind() {
    let (client, transport) = mock_client();

    let alpha = client.private_read_with_metadata(b"alpha").unwrap().unwrap();
    assert_eq!(alpha.data.as_json(), Some(&json!({"color": "red", "count": 3})));
    assert_eq!(alpha.data.as_bytes(), None);
    assert_eq!(alpha.metadata.unwrap()["owner"], "ops");

    let bravo = client.private_read_with_metadata(b"bravo").unwrap().unwrap();
    assert_eq!(bravo.data, Payload::Bytes(b"\x00\x01\x02binary".to_vec()));
    assert_eq!(bravo.metadata, None);

    assert_eq!(
        client.private_read(b"charlie").unwrap(),
        Some(Payload::Json(json!("just a string")))
    );

    let delta = client.private_read_with_metadata(b"delta").unwrap().unwrap();
    assert_eq!(delta.data.as_bytes(), Some(&[0xde, 0xad, 0xbe, 0xef][..]));
    let meta = delta.metadata.unwrap();
    assert_eq!(meta["source"], "sensor-7");
    assert_eq!(meta[CONTENT_TYPE], CONTENT_TYPE_BYTES);

    assert_eq!(client.private_read(b"zulu").unwrap(), None);
    assert_eq!(transport.setups.load(Ordering::SeqCst), 1, "session is opened once");
}

#[test]
fn test_session_lifecycle() {
    let (client, transport) = mock_client();
    assert!(matches!(client.session_id(), Err(Error::NeedSetup)));

    assert_eq!(client.setup(Some("known")).unwrap(), "known");
    assert_eq!(transport.setups.load(Ordering::SeqCst), 0);
    // Already set up; a different id is ignored.
    assert_eq!(client.setup(Some("other")).unwrap(), "known");

    assert!(client.private_read(b"alpha").unwrap().is_some());

    let (fresh, transport) = mock_client();
    assert_eq!(fresh.setup(Some("stale")).unwrap(), SESSION);
    assert_eq!(transport.setups.load(Ordering::SeqCst), 1);
}

#[test]
fn test_reads_are_split_into_batches() {
    let (client, transport) = mock_client();
    let keys = [
        "alpha", "bravo", "charlie", "delta", "golf", "hotel", "india", "juliet", "kilo", "lima", "zulu", "alpha",
    ];
    let records = client.private_read_many(&keys).unwrap();

    assert_eq!(*transport.batch_sizes.lock().unwrap(), vec![5, 5, 2]);
    assert_eq!(records.len(), keys.len());
    let present: Vec<bool> = records.iter().map(Option::is_some).collect();
    assert_eq!(
        present,
        vec![true, true, true, true, false, false, false, false, false, false, false, true]
    );
}

#[test]
fn test_failed_key_does_not_affect_siblings() {
    let (client, _) = mock_client();
    let records = client.private_read_many(&["alpha", "echo", "foxtrot", "charlie"]).unwrap();
    assert!(records[0].is_some());
    assert!(records[1].is_none(), "corrupt stream yields an absent record");
    assert!(records[2].is_none(), "empty row yields an absent record");
    assert!(records[3].is_some());
}

#[test]
fn test_key_intersect_uses_filter() {
    let (client, transport) = mock_client();
    let keys = ["alpha", "zulu", "delta", "nobody"];
    let hits = client.private_key_intersect(&keys).unwrap();
    assert_eq!(hits, vec![&"alpha", &"delta"]);
    assert_eq!(transport.filter_fetches.load(Ordering::SeqCst), 1);
    assert!(transport.batch_sizes.lock().unwrap().is_empty(), "no private reads needed");
}

#[test]
fn test_intersect_retrieves_values() {
    let (client, _) = mock_client();
    let keys = ["charlie", "zulu", "bravo"];

    let matches = client.private_intersect(&keys, true).unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(*matches[0].key, "charlie");
    assert_eq!(matches[0].value, Some(Payload::Json(json!("just a string"))));
    assert_eq!(*matches[1].key, "bravo");

    let keys_only = client.private_intersect(&keys, false).unwrap();
    assert!(keys_only.iter().all(|m| m.value.is_none()));
    assert_eq!(keys_only.len(), 2);
}

#[test]
fn test_small_intersections_skip_the_filter() {
    let config = ClientConfig {
        bloom_cutoff: 10,
        ..ClientConfig::default()
    };
    let (client, transport) = mock_client_with(config);

    let hits = client.private_key_intersect(&["delta", "zulu"]).unwrap();
    assert_eq!(hits, vec![&"delta"]);
    let matches = client.private_intersect(&["zulu", "alpha"], true).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(*matches[0].key, "alpha");

    assert_eq!(transport.filter_fetches.load(Ordering::SeqCst), 0);
}

#[test]
fn test_write_uploads_wrapped_records() {
    let (client, transport) = mock_client();
    let mut batch = client.write_batch();
    batch.insert_value(b"user:1", &json!({"name": "ada"}), None).unwrap();
    batch.insert(b"blob", &Payload::Bytes(vec![9, 9]), None).unwrap();
    client.write(batch).unwrap();

    let writes = transport.writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    let keys: Vec<&[u8]> = KeyValueIter::new(&writes[0]).map(|kv| kv.unwrap().0).collect();
    assert_eq!(keys, vec![&b"user:1"[..], &b"blob"[..]]);
}

#[test]
fn test_config_must_match_codec() {
    let result = RetrievalClient::new(
        ClientConfig::default(),
        Arc::new(PassThroughCodec),
        Arc::new(MockPrimitive),
        Arc::new(MockTransport::new()),
    );
    assert!(matches!(result, Err(Error::Config(_))));

    let bad_batch = ClientConfig {
        batch_size: 0,
        ..ClientConfig::default()
    };
    let result = RetrievalClient::new(
        bad_batch,
        Arc::new(Bzip2Codec),
        Arc::new(MockPrimitive),
        Arc::new(MockTransport::new()),
    );
    assert!(matches!(result, Err(Error::Config(_))));
}
