//! Result cache capability.
//!
//! The engine never treats a cache failure as an error: a failed get is a
//! miss, a failed set is skipped. Staleness up to the entry TTL is an
//! accepted property of every cached read.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::sync::Cache;

pub trait FeedCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);
    fn delete(&self, key: &str);
}

#[derive(Clone)]
struct Entry {
    bytes: Arc<Vec<u8>>,
    ttl: Duration,
}

struct PerEntryExpiry;

impl Expiry<String, Entry> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-process cache with per-entry TTL.
pub struct MokaFeedCache {
    inner: Cache<String, Entry>,
}

impl MokaFeedCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .expire_after(PerEntryExpiry)
                .build(),
        }
    }
}

impl FeedCache for MokaFeedCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.get(key).map(|entry| entry.bytes.as_ref().clone())
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.inner.insert(
            key.to_string(),
            Entry {
                bytes: Arc::new(value),
                ttl,
            },
        );
    }

    fn delete(&self, key: &str) {
        self.inner.invalidate(key);
    }
}

/// Cache that stores nothing; every lookup is a miss.
pub struct NoopCache;

impl FeedCache for NoopCache {
    fn get(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }

    fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) {}

    fn delete(&self, _key: &str) {}
}
