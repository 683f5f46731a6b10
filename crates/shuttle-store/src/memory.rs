//! In-memory Shared Memory Store (C3): an LRU-bounded, TTL-expiring,
//! content-addressed blob store, backed by an `lru::LruCache` behind a
//! `Mutex` with its own byte-budget eviction accounting.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use lru::LruCache;
use serde_json::Value;
use shuttle_core::error::Error;
use shuttle_core::model::{DataLocation, DataMetadata, DataPreview, DataReference, DataSchema, DataType, SchemaField};
use shuttle_core::offload::{SharedMemoryStore, StoreStats};

struct Entry {
    bytes: Vec<u8>,
    compressed: bool,
    original_len: usize,
    media_type: String,
    tags: Vec<String>,
    stored_at: Instant,
}

pub struct LruSharedMemoryStore {
    entries: Mutex<LruCache<String, Entry>>,
    max_bytes: usize,
    ttl: Duration,
    compression_threshold: usize,
}

impl LruSharedMemoryStore {
    /// `compression_threshold`: payloads at or above this size (in bytes,
    /// before compression) are gzip-compressed in place; smaller payloads
    /// are kept raw since the gzip frame overhead would outweigh the
    /// savings.
    pub fn new(max_bytes: usize, ttl: Duration, compression_threshold: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(NonZeroUsize::new(usize::MAX).unwrap())),
            max_bytes,
            ttl,
            compression_threshold,
        }
    }

    fn compress(bytes: &[u8]) -> Result<Vec<u8>, Error> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).map_err(|e| Error::SharedMemory(format!("compression failed: {e}")))?;
        encoder.finish().map_err(|e| Error::SharedMemory(format!("compression failed: {e}")))
    }

    fn decompress(entry: &Entry) -> Result<Vec<u8>, Error> {
        if !entry.compressed {
            return Ok(entry.bytes.clone());
        }
        let mut decoder = GzDecoder::new(entry.bytes.as_slice());
        let mut out = Vec::with_capacity(entry.original_len);
        decoder.read_to_end(&mut out).map_err(|e| Error::SharedMemory(format!("decompression failed: {e}")))?;
        Ok(out)
    }

    fn current_bytes(cache: &LruCache<String, Entry>) -> usize {
        cache.iter().map(|(_, e)| e.bytes.len()).sum()
    }

    fn evict_to_fit(cache: &mut LruCache<String, Entry>, incoming: usize, max_bytes: usize) {
        while Self::current_bytes(cache) + incoming > max_bytes {
            if cache.pop_lru().is_none() {
                break;
            }
        }
    }

    fn detect_type(bytes: &[u8]) -> (DataType, Option<Value>) {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(v @ Value::Object(_)) => (DataType::JsonObject, Some(v)),
            Ok(v @ Value::Array(_)) => (DataType::JsonArray, Some(v)),
            _ => (DataType::Text, None),
        }
    }

    fn build_metadata(entry: &Entry) -> Result<DataMetadata, Error> {
        let plain = Self::decompress(entry)?;
        let (data_type, parsed) = Self::detect_type(&plain);
        let (preview, schema) = match (&data_type, &parsed) {
            (DataType::JsonArray, Some(Value::Array(items))) => {
                let first5 = items.iter().take(5).cloned().collect();
                let last5 = items.iter().rev().take(5).cloned().collect::<Vec<_>>().into_iter().rev().collect();
                (DataPreview { first5, last5 }, DataSchema { fields: vec![], item_count: items.len() })
            }
            (DataType::JsonObject, Some(Value::Object(map))) => {
                let fields = map
                    .iter()
                    .map(|(k, v)| SchemaField { name: k.clone(), r#type: json_type_name(v).to_string() })
                    .collect();
                (DataPreview::default(), DataSchema { fields, item_count: map.len() })
            }
            _ => (DataPreview::default(), DataSchema::default()),
        };

        Ok(DataMetadata {
            size_bytes: entry.original_len,
            estimated_tokens: entry.original_len / 4,
            data_type,
            preview,
            schema,
        })
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl SharedMemoryStore for LruSharedMemoryStore {
    async fn store(&self, id: &str, bytes: Vec<u8>, media_type: &str, tags: &[String]) -> Result<DataReference, Error> {
        let original_len = bytes.len();
        let (stored_bytes, compressed) = if original_len >= self.compression_threshold {
            (Self::compress(&bytes)?, true)
        } else {
            (bytes, false)
        };

        let mut cache = self.entries.lock().expect("shared memory store lock poisoned");
        Self::evict_to_fit(&mut cache, stored_bytes.len(), self.max_bytes);
        cache.put(
            id.to_string(),
            Entry {
                bytes: stored_bytes,
                compressed,
                original_len,
                media_type: media_type.to_string(),
                tags: tags.to_vec(),
                stored_at: Instant::now(),
            },
        );
        Ok(DataReference {
            id: id.to_string(),
            location: DataLocation::Memory,
            metadata: std::collections::HashMap::new(),
        })
    }

    async fn get(&self, reference: &DataReference) -> Result<Vec<u8>, Error> {
        let mut cache = self.entries.lock().expect("shared memory store lock poisoned");
        let entry = cache
            .get(&reference.id)
            .ok_or_else(|| Error::SharedMemory(format!("no such entry: {}", reference.id)))?;
        if entry.stored_at.elapsed() > self.ttl {
            cache.pop(&reference.id);
            return Err(Error::SharedMemory(format!("entry expired: {}", reference.id)));
        }
        Self::decompress(entry)
    }

    async fn get_metadata(&self, reference: &DataReference) -> Result<DataMetadata, Error> {
        let cache = self.entries.lock().expect("shared memory store lock poisoned");
        let entry = cache
            .peek(&reference.id)
            .ok_or_else(|| Error::SharedMemory(format!("no such entry: {}", reference.id)))?;
        Self::build_metadata(entry)
    }

    async fn stats(&self) -> Result<StoreStats, Error> {
        let cache = self.entries.lock().expect("shared memory store lock poisoned");
        Ok(StoreStats {
            item_count: cache.len(),
            bytes: Self::current_bytes(&cache),
        })
    }
}

/// Entries whose media type or tags mark them for inspection tooling
/// (diagnostics only; not part of the storage contract itself).
pub fn describe_entry_tags(tags: &[String]) -> String {
    if tags.is_empty() {
        "untagged".to_string()
    } else {
        tags.join(", ")
    }
}
