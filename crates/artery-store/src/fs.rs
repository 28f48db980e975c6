use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::fs::{self, File};
use tokio_util::io::ReaderStream;

use crate::store::{ByteStream, ObjectMeta, ObjectStore, StoreError};

// Retry configuration constants
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_MS: u64 = 100;

/// Local directory posing as an object bucket. Keys map directly to
/// relative paths under the root; content type is inferred from the key
/// extension since the filesystem stores no object metadata.
#[derive(Clone)]
pub struct FsBucket {
    root: PathBuf,
}

impl FsBucket {
    pub fn new(root: PathBuf) -> Self {
        FsBucket { root }
    }

    pub async fn prepare(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).await.map_err(|err| {
            StoreError::Unavailable(format!("creating bucket root {}: {err}", self.root.display()))
        })
    }

    pub fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    async fn open(&self, key: &str) -> Result<Option<(File, u64)>, StoreError> {
        if key.is_empty() || key.contains("..") || key.starts_with('/') {
            tracing::warn!(key = %key, "rejected key outside the bucket root");
            return Ok(None);
        }
        let path = self.resolve(key);

        // Retry logic for file open
        let mut attempt = 0;
        let file = loop {
            attempt += 1;
            match File::open(&path).await {
                Ok(file) => break file,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                Err(e) if should_retry(&e) && attempt < MAX_ATTEMPTS => {
                    tracing::debug!(
                        "open attempt {}/{} failed with {:?}, retrying in {}ms: {}",
                        attempt,
                        MAX_ATTEMPTS,
                        e.kind(),
                        BACKOFF_MS,
                        path.display()
                    );
                    tokio::time::sleep(Duration::from_millis(BACKOFF_MS)).await;
                    continue;
                }
                Err(e) => {
                    return Err(StoreError::Unavailable(format!(
                        "opening {} (after {attempt} attempts): {e}",
                        path.display()
                    )));
                }
            }
        };

        let metadata = file.metadata().await.map_err(|err| {
            StoreError::Unavailable(format!("reading metadata {}: {err}", path.display()))
        })?;
        if metadata.is_dir() {
            return Ok(None);
        }

        Ok(Some((file, metadata.len())))
    }

    fn meta_for(&self, key: &str, size: u64) -> ObjectMeta {
        ObjectMeta {
            size: Some(size),
            content_type: content_type_for(key).map(str::to_string),
            etag: None,
        }
    }
}

#[async_trait]
impl ObjectStore for FsBucket {
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        match self.open(key).await? {
            Some((_, size)) => Ok(Some(self.meta_for(key, size))),
            None => Ok(None),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<(ObjectMeta, ByteStream)>, StoreError> {
        match self.open(key).await? {
            Some((file, size)) => {
                let meta = self.meta_for(key, size);
                let stream = ReaderStream::new(file).boxed();
                Ok(Some((meta, stream)))
            }
            None => Ok(None),
        }
    }
}

fn content_type_for(key: &str) -> Option<&'static str> {
    let extension = Path::new(key).extension()?.to_str()?;
    match extension {
        "json" => Some("application/json"),
        "tgz" | "gz" => Some("application/gzip"),
        "txt" => Some("text/plain"),
        _ => None,
    }
}

/// Determines if an I/O error should be retried
fn should_retry(error: &std::io::Error) -> bool {
    matches!(error.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted)
        || matches!(error.raw_os_error(), Some(16) | Some(11))
    // 16 = EBUSY (Device or resource busy)
    // 11 = EAGAIN (Resource temporarily unavailable)
}
