use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use parking_lot::Mutex;

use crate::store::{ByteStream, ObjectMeta, ObjectStore, StoreError};

struct StoredObject {
    content_type: Option<String>,
    body: Bytes,
}

/// In-memory bucket for tests and local experiments. Counts backend
/// calls so callers can assert cache effectiveness.
#[derive(Default)]
pub struct MemoryBucket {
    objects: Mutex<HashMap<String, StoredObject>>,
    head_calls: AtomicU64,
    get_calls: AtomicU64,
}

impl MemoryBucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        key: impl Into<String>,
        content_type: Option<&str>,
        body: impl Into<Bytes>,
    ) {
        self.objects.lock().insert(
            key.into(),
            StoredObject {
                content_type: content_type.map(str::to_string),
                body: body.into(),
            },
        );
    }

    pub fn head_calls(&self) -> u64 {
        self.head_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> u64 {
        self.get_calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, key: &str) -> Option<(ObjectMeta, Bytes)> {
        let objects = self.objects.lock();
        let object = objects.get(key)?;
        let meta = ObjectMeta {
            size: Some(object.body.len() as u64),
            content_type: object.content_type.clone(),
            etag: None,
        };
        Some((meta, object.body.clone()))
    }
}

#[async_trait]
impl ObjectStore for MemoryBucket {
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.lookup(key).map(|(meta, _)| meta))
    }

    async fn get(&self, key: &str) -> Result<Option<(ObjectMeta, ByteStream)>, StoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.lookup(key).map(|(meta, body)| {
            let stream = stream::iter([Ok(body)]).boxed();
            (meta, stream)
        }))
    }
}
