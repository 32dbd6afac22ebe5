//! Query result cache
//!
//! Keyed by (generation, normalized predicate, options); the generation
//! bump on every writer makes invalidation O(1). Values over 10 KB are
//! gzip-compressed. TTL plus LRU size cap.

use std::io::{Read, Write};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use lru::LruCache;
use serde_json::Value;

const COMPRESS_THRESHOLD: usize = 10 * 1024;

struct CacheEntry {
    created: Instant,
    bytes: Vec<u8>,
    compressed: bool,
}

pub struct ResultCache {
    inner: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        ResultCache {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn key(generation: u64, normalized_predicate: &str, options_key: &str) -> String {
        format!("{generation}|{normalized_predicate}|{options_key}")
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut cache = self.inner.lock().ok()?;
        let expired = {
            let entry = cache.get(key)?;
            entry.created.elapsed() > self.ttl
        };
        if expired {
            cache.pop(key);
            return None;
        }
        let (bytes, compressed) = {
            let entry = cache.get(key)?;
            (entry.bytes.clone(), entry.compressed)
        };
        let bytes = if compressed {
            let mut decoder = GzDecoder::new(bytes.as_slice());
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).ok()?;
            out
        } else {
            bytes
        };
        serde_json::from_slice(&bytes).ok()
    }

    pub fn put(&self, key: String, value: &Value) {
        let Ok(raw) = serde_json::to_vec(value) else {
            return;
        };
        let (bytes, compressed) = if raw.len() > COMPRESS_THRESHOLD {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
            match encoder.write_all(&raw).and_then(|_| encoder.finish()) {
                Ok(compressed) => (compressed, true),
                Err(_) => (raw, false),
            }
        } else {
            (raw, false)
        };
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(
                key,
                CacheEntry {
                    created: Instant::now(),
                    bytes,
                    compressed,
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
