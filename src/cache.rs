use std::time::{Duration, Instant};

use moka::future::Cache;
use moka::Expiry;

/// What the metadata cache knows about a container key.
///
/// `Negative` is the short-lived "known absent" marker that bounds the
/// window before a newly created container becomes visible. `Record` holds
/// the serialized metadata exactly as the origin database returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedMetadata {
    Negative,
    Record(String),
}

#[derive(Debug, Clone)]
struct Entry {
    value: CachedMetadata,
    ttl: Duration,
}

struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-process metadata cache with a per-entry TTL. Every operation is
/// best-effort: a failure is indistinguishable from a miss.
///
/// Cloning is cheap — clones share the same underlying store.
#[derive(Clone)]
pub struct MetadataCache {
    inner: Cache<String, Entry>,
}

impl MetadataCache {
    pub fn new(max_entries: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_entries)
                .expire_after(EntryTtl)
                .build(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<CachedMetadata> {
        self.inner.get(key).await.map(|e| e.value)
    }

    pub async fn set(&self, key: &str, value: CachedMetadata, ttl: Duration) {
        self.inner.insert(key.to_string(), Entry { value, ttl }).await;
    }

    pub async fn delete(&self, key: &str) {
        self.inner.invalidate(key).await;
    }
}
