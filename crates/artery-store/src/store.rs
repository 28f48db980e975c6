use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use thiserror::Error;

/// Lazily-consumed object body. Bytes are pulled only as the caller
/// consumes them, so large artifacts never sit in memory whole.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Metadata describing a stored object, as reported by the backend.
///
/// A HEAD and a GET for the same key report the same metadata; the
/// bucket owns that invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Byte size, when the backend reports one.
    pub size: Option<u64>,
    /// Content type from stored metadata, if any.
    pub content_type: Option<String>,
    /// Opaque validator (etag-equivalent), if the backend exposes one.
    pub etag: Option<String>,
}

/// Backend failure distinct from genuine absence.
///
/// Absence is `Ok(None)` from the store operations; an `Unavailable`
/// error must never be collapsed into it, or clients cache a false
/// "package does not exist" during an outage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object storage unavailable: {0}")]
    Unavailable(String),
}

/// Read-only object storage addressed by flat string keys.
///
/// Both operations are idempotent and side-effect free. Retry policy,
/// if any, belongs to the implementation; callers issue a single call
/// per request.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch object metadata without reading the body.
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError>;

    /// Fetch metadata plus a lazily-consumed byte stream.
    async fn get(&self, key: &str) -> Result<Option<(ObjectMeta, ByteStream)>, StoreError>;
}
