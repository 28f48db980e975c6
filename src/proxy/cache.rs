//! Edge cache in front of the storage gateway.
//!
//! Read-through: consulted before the bucket, populated after a
//! successful fetch, invisible to the client either way. The proxy is
//! fully correct with no cache at all — everything here is an
//! optimization.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rama::http::{Method, StatusCode};

/// Cache key: normalized request URL plus the method, since HEAD and
/// GET responses differ in body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub method: Method,
    pub url: String,
}

/// A previously built response, complete enough to replay. Bodies are
/// only captured below a configured size bound, so entries stay small
/// even when the bucket serves large tarballs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub etag: Option<String>,
    pub body: Bytes,
}

/// Provider contract for the edge cache. Both operations are
/// best-effort: implementations swallow their own failures, and a
/// missed store never fails the request that triggered it.
#[async_trait]
pub trait EdgeCache: Send + Sync {
    async fn lookup(&self, key: &CacheKey) -> Option<CachedResponse>;
    async fn store(&self, key: CacheKey, response: CachedResponse);
}

struct Entry {
    stored_at: Instant,
    response: CachedResponse,
}

/// In-process cache with a TTL and an entry-count bound. Entries are
/// trusted for their full TTL; there is no re-validation against
/// storage.
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, Entry>>,
    ttl: Duration,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl EdgeCache for MemoryCache {
    async fn lookup(&self, key: &CacheKey) -> Option<CachedResponse> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() <= self.ttl => {
                return Some(entry.response.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        None
    }

    async fn store(&self, key: CacheKey, response: CachedResponse) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            // Drop expired entries first, then the oldest survivor.
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.stored_at.elapsed() <= ttl);
            if entries.len() >= self.max_entries {
                if let Some(oldest) = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.stored_at)
                    .map(|(key, _)| key.clone())
                {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(
            key,
            Entry {
                stored_at: Instant::now(),
                response,
            },
        );
    }
}
