pub mod cache;
pub mod resolver;
pub mod response;
pub mod rewrite;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use bytes::{Bytes, BytesMut};
use futures_util::TryStreamExt;
use rama::{
    Service,
    error::BoxError,
    http::{Body, Method, Request, Response, StatusCode},
};
use tracing::{error, info, warn};

use artery_store::{ByteStream, ObjectMeta, ObjectStore, StoreError};

use crate::config::Config;

// Re-export public types
pub use cache::{CacheKey, CachedResponse, EdgeCache, MemoryCache};
pub use rewrite::{RewriteHook, map_root};
pub use types::{CacheStatus, ProxyError, RequestContext};

/// Main proxy service.
///
/// Stateless per-request pipeline: edge-cache lookup, rewrite hook,
/// path resolution, a single storage call, response assembly, edge-cache
/// store. The cache and the rewrite hook are optional collaborators;
/// every correctness property holds without them.
#[derive(Clone)]
pub struct RegistryProxy {
    config: Arc<Config>,
    store: Arc<dyn ObjectStore>,
    cache: Option<Arc<dyn EdgeCache>>,
    rewrite: Option<RewriteHook>,
}

impl RegistryProxy {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn ObjectStore>,
        cache: Option<Arc<dyn EdgeCache>>,
        rewrite: Option<RewriteHook>,
    ) -> Self {
        if cache.is_none() {
            tracing::info!("No edge cache configured - every request reaches the bucket");
        }
        Self {
            config,
            store,
            cache,
            rewrite,
        }
    }

    async fn handle(&self, req: Request<Body>, ctx: &mut RequestContext) -> Result<Response<Body>> {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();

        if method == Method::GET && path == "/up" {
            return response::respond_text(StatusCode::OK, "OK");
        }

        // Only HEAD and GET carry meaning for artifact delivery.
        if method != Method::GET && method != Method::HEAD {
            return response::respond_error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
        }

        self.dispatch(&method, &path, ctx).await
    }

    async fn dispatch(
        &self,
        method: &Method,
        raw_path: &str,
        ctx: &mut RequestContext,
    ) -> Result<Response<Body>> {
        // The normalized URL doubles as the cache key, so encoded and
        // literal spellings of the same name share one entry.
        let normalized = match resolver::resolve_key(raw_path) {
            Ok(url) => url,
            Err(err) => return response::error_response(&err),
        };
        let cache_key = CacheKey {
            method: method.clone(),
            url: normalized,
        };

        if let Some(cache) = &self.cache {
            if let Some(entry) = cache.lookup(&cache_key).await {
                ctx.cache = CacheStatus::Hit;
                return response::from_cached(&entry);
            }
            ctx.cache = CacheStatus::Miss;
        }

        // The hook sees the raw, still-encoded path; decoding follows.
        let effective = self
            .rewrite
            .as_ref()
            .and_then(|hook| hook(raw_path))
            .unwrap_or_else(|| raw_path.to_owned());
        let key = match resolver::resolve_key(&effective) {
            Ok(key) => key,
            Err(err) => return response::error_response(&err),
        };

        if *method == Method::HEAD {
            return match self.store.head(&key).await {
                Ok(Some(meta)) => {
                    self.offer_to_cache(cache_key, &meta, Bytes::new()).await;
                    response::object_response(&meta, None)
                }
                Ok(None) => response::not_found(),
                Err(err) => self.storage_failure(ctx, err),
            };
        }

        match self.store.get(&key).await {
            Ok(Some((meta, stream))) => self.respond_streaming(cache_key, meta, stream, ctx).await,
            Ok(None) => response::not_found(),
            Err(err) => self.storage_failure(ctx, err),
        }
    }

    /// Serves a GET result, capturing the body for the cache only when
    /// the object is small enough. Larger artifacts stream through
    /// without ever being materialized whole.
    async fn respond_streaming(
        &self,
        cache_key: CacheKey,
        meta: ObjectMeta,
        stream: ByteStream,
        ctx: &mut RequestContext,
    ) -> Result<Response<Body>> {
        let capture = self.cache.is_some()
            && meta
                .size
                .is_some_and(|size| size <= self.config.cache.max_body_bytes);

        if !capture {
            if self.cache.is_some() {
                ctx.cache = CacheStatus::Pass;
            }
            return response::object_response(&meta, Some(stream));
        }

        let body = match collect_body(stream, meta.size.unwrap_or(0) as usize).await {
            Ok(body) => body,
            Err(err) => {
                return self.storage_failure(ctx, StoreError::Unavailable(err.to_string()));
            }
        };

        let entry = response::cache_entry(&meta, body);
        self.store_entry(cache_key, entry.clone()).await;
        response::from_cached(&entry)
    }

    async fn offer_to_cache(&self, cache_key: CacheKey, meta: &ObjectMeta, body: Bytes) {
        let entry = response::cache_entry(meta, body);
        self.store_entry(cache_key, entry).await;
    }

    async fn store_entry(&self, cache_key: CacheKey, entry: CachedResponse) {
        if let Some(cache) = &self.cache {
            cache.store(cache_key, entry).await;
        }
    }

    fn storage_failure(
        &self,
        ctx: &mut RequestContext,
        err: StoreError,
    ) -> Result<Response<Body>> {
        ctx.cache = CacheStatus::Error;
        warn!(error = %err, "storage backend unavailable");
        response::error_response(&ProxyError::Store(err))
    }

    fn request_summary(&self, ctx: &RequestContext) -> String {
        format!("{} {}", ctx.method.as_str(), ctx.path)
    }
}

/// Drains an object stream into one buffer. Only called for objects
/// below the configured cache body bound.
async fn collect_body(stream: ByteStream, size_hint: usize) -> std::io::Result<Bytes> {
    let buf = stream
        .try_fold(
            BytesMut::with_capacity(size_hint),
            |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            },
        )
        .await?;
    Ok(buf.freeze())
}

impl Service<Request<Body>> for RegistryProxy {
    type Output = Response<Body>;
    type Error = BoxError;

    async fn serve(&self, req: Request<Body>) -> Result<Self::Output, Self::Error> {
        let mut ctx = RequestContext::from_request(&req);

        let result = self.handle(req, &mut ctx).await;

        match &result {
            Ok(resp) => {
                let response_code = resp.status().as_u16();
                let duration_ms = ctx.start.elapsed().as_millis();
                info!(
                    summary = %self.request_summary(&ctx),
                    response_code,
                    duration_ms,
                    cache_status = %ctx.cache,
                    "request handled"
                );
            }
            Err(err) => {
                let duration_ms = ctx.start.elapsed().as_millis();
                error!(
                    summary = %self.request_summary(&ctx),
                    duration_ms,
                    cache_status = %ctx.cache,
                    error = %err,
                    "request failed"
                );
            }
        }

        result.map_err(|e| e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artery_store::MemoryBucket;
    use async_trait::async_trait;
    use rama::http::{HeaderMap, body::util::BodyExt, header};
    use std::time::Duration;

    use crate::config::CacheConfig;

    struct FailingBucket;

    #[async_trait]
    impl ObjectStore for FailingBucket {
        async fn head(&self, _key: &str) -> Result<Option<ObjectMeta>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn get(&self, _key: &str) -> Result<Option<(ObjectMeta, ByteStream)>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn proxy_with(
        store: Arc<dyn ObjectStore>,
        cache: Option<Arc<dyn EdgeCache>>,
        rewrite: Option<RewriteHook>,
    ) -> RegistryProxy {
        RegistryProxy::new(Arc::new(Config::default()), store, cache, rewrite)
    }

    fn seeded_bucket() -> Arc<MemoryBucket> {
        let bucket = MemoryBucket::new();
        bucket.insert("@jsr/std__yaml", Some("application/json"), "{}");
        Arc::new(bucket)
    }

    fn memory_cache() -> Arc<dyn EdgeCache> {
        Arc::new(MemoryCache::new(Duration::from_secs(60), 64))
    }

    async fn send(proxy: &RegistryProxy, method: Method, path: &str) -> Response<Body> {
        let req = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        proxy.serve(req).await.unwrap()
    }

    async fn body_bytes(resp: Response<Body>) -> Bytes {
        resp.into_body().collect().await.unwrap().to_bytes()
    }

    fn artifact_headers(headers: &HeaderMap) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        pairs.sort();
        pairs
    }

    // ============================================================================
    // Path form equivalence (literal vs percent-encoded separator)
    // ============================================================================

    #[tokio::test]
    async fn get_with_literal_separator_serves_the_object() {
        let proxy = proxy_with(seeded_bucket(), None, None);
        let resp = send(&proxy, Method::GET, "/@jsr/std__yaml").await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(body_bytes(resp).await, Bytes::from_static(b"{}"));
    }

    #[tokio::test]
    async fn get_with_encoded_separator_serves_the_same_object() {
        let proxy = proxy_with(seeded_bucket(), None, None);
        let resp = send(&proxy, Method::GET, "/@jsr%2Fstd__yaml").await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(body_bytes(resp).await, Bytes::from_static(b"{}"));
    }

    #[tokio::test]
    async fn both_path_forms_share_one_cache_entry() {
        let bucket = seeded_bucket();
        let proxy = proxy_with(bucket.clone(), Some(memory_cache()), None);

        send(&proxy, Method::GET, "/@jsr%2Fstd__yaml").await;
        let resp = send(&proxy, Method::GET, "/@jsr/std__yaml").await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(bucket.get_calls(), 1);
    }

    // ============================================================================
    // Not found
    // ============================================================================

    #[tokio::test]
    async fn empty_bucket_yields_404_with_empty_body() {
        let proxy = proxy_with(Arc::new(MemoryBucket::new()), None, None);

        for path in ["/@jsr/std__yaml", "/@jsr%2Fstd__yaml", "/root.json"] {
            let resp = send(&proxy, Method::GET, path).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "path {path}");
            assert!(resp.headers().get(header::CONTENT_TYPE).is_none());
            assert!(body_bytes(resp).await.is_empty());
        }
    }

    #[tokio::test]
    async fn root_without_rewrite_hook_is_not_found() {
        let proxy = proxy_with(seeded_bucket(), None, None);
        let resp = send(&proxy, Method::GET, "/").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    // ============================================================================
    // Rewrite hook
    // ============================================================================

    #[tokio::test]
    async fn root_rewrite_serves_the_mapped_object() {
        let bucket = MemoryBucket::new();
        bucket.insert("root.json", Some("application/json"), "{\"registry\":true}");
        let proxy = proxy_with(Arc::new(bucket), None, Some(map_root("root.json")));

        let resp = send(&proxy, Method::GET, "/").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_bytes(resp).await,
            Bytes::from_static(b"{\"registry\":true}")
        );
    }

    #[tokio::test]
    async fn rewrite_hook_leaves_other_paths_alone() {
        let proxy = proxy_with(seeded_bucket(), None, Some(map_root("root.json")));
        let resp = send(&proxy, Method::GET, "/@jsr/std__yaml").await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    // ============================================================================
    // HEAD / GET symmetry
    // ============================================================================

    #[tokio::test]
    async fn head_returns_get_headers_with_empty_body() {
        let proxy = proxy_with(seeded_bucket(), None, None);

        let get = send(&proxy, Method::GET, "/@jsr/std__yaml").await;
        let head = send(&proxy, Method::HEAD, "/@jsr/std__yaml").await;

        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(
            artifact_headers(head.headers()),
            artifact_headers(get.headers())
        );
        assert!(body_bytes(head).await.is_empty());
    }

    #[tokio::test]
    async fn head_for_missing_key_is_404() {
        let proxy = proxy_with(Arc::new(MemoryBucket::new()), None, None);
        let resp = send(&proxy, Method::HEAD, "/@jsr/std__yaml").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    // ============================================================================
    // Idempotence
    // ============================================================================

    #[tokio::test]
    async fn repeated_gets_return_identical_responses() {
        let proxy = proxy_with(seeded_bucket(), None, None);

        let first = send(&proxy, Method::GET, "/@jsr/std__yaml").await;
        let second = send(&proxy, Method::GET, "/@jsr/std__yaml").await;

        assert_eq!(first.status(), second.status());
        assert_eq!(
            artifact_headers(first.headers()),
            artifact_headers(second.headers())
        );
        assert_eq!(body_bytes(first).await, body_bytes(second).await);
    }

    #[tokio::test]
    async fn repeated_gets_are_identical_through_the_cache() {
        let bucket = seeded_bucket();
        let proxy = proxy_with(bucket.clone(), Some(memory_cache()), None);

        let first = send(&proxy, Method::GET, "/@jsr/std__yaml").await;
        let second = send(&proxy, Method::GET, "/@jsr/std__yaml").await;

        assert_eq!(first.status(), second.status());
        assert_eq!(
            artifact_headers(first.headers()),
            artifact_headers(second.headers())
        );
        assert_eq!(body_bytes(first).await, body_bytes(second).await);
        assert_eq!(bucket.get_calls(), 1);
    }

    // ============================================================================
    // Edge cache behavior
    // ============================================================================

    #[tokio::test]
    async fn cache_hit_skips_the_bucket() {
        let bucket = seeded_bucket();
        let proxy = proxy_with(bucket.clone(), Some(memory_cache()), None);

        send(&proxy, Method::GET, "/@jsr/std__yaml").await;
        send(&proxy, Method::GET, "/@jsr/std__yaml").await;
        send(&proxy, Method::GET, "/@jsr/std__yaml").await;

        assert_eq!(bucket.get_calls(), 1);
    }

    #[tokio::test]
    async fn head_and_get_are_cached_separately() {
        let bucket = seeded_bucket();
        let proxy = proxy_with(bucket.clone(), Some(memory_cache()), None);

        send(&proxy, Method::HEAD, "/@jsr/std__yaml").await;
        let resp = send(&proxy, Method::GET, "/@jsr/std__yaml").await;

        // The HEAD entry must not satisfy the GET.
        assert_eq!(body_bytes(resp).await, Bytes::from_static(b"{}"));
        assert_eq!(bucket.head_calls(), 1);
        assert_eq!(bucket.get_calls(), 1);
    }

    #[tokio::test]
    async fn oversized_objects_stream_through_uncached() {
        let bucket = Arc::new(MemoryBucket::new());
        bucket.insert("@jsr/big", None, vec![0u8; 64]);
        let config = Config {
            cache: CacheConfig {
                max_body_bytes: 16,
                ..CacheConfig::default()
            },
            ..Config::default()
        };
        let proxy = RegistryProxy::new(Arc::new(config), bucket.clone(), Some(memory_cache()), None);

        let first = send(&proxy, Method::GET, "/@jsr/big").await;
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(body_bytes(first).await.len(), 64);

        send(&proxy, Method::GET, "/@jsr/big").await;

        // Both requests reached the bucket; nothing was captured.
        assert_eq!(bucket.get_calls(), 2);
    }

    // ============================================================================
    // Error taxonomy
    // ============================================================================

    #[tokio::test]
    async fn malformed_encoding_is_400() {
        let proxy = proxy_with(seeded_bucket(), None, None);
        let resp = send(&proxy, Method::GET, "/@jsr/%ff").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unavailable_backend_is_502_never_404() {
        let proxy = proxy_with(Arc::new(FailingBucket), None, None);

        let get = send(&proxy, Method::GET, "/@jsr/std__yaml").await;
        assert_eq!(get.status(), StatusCode::BAD_GATEWAY);
        assert!(body_bytes(get).await.is_empty());

        let head = send(&proxy, Method::HEAD, "/@jsr/std__yaml").await;
        assert_eq!(head.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn backend_failure_is_not_stored_in_the_cache() {
        let cache = memory_cache();
        let proxy = proxy_with(Arc::new(FailingBucket), Some(cache.clone()), None);

        send(&proxy, Method::GET, "/@jsr/std__yaml").await;

        let key = CacheKey {
            method: Method::GET,
            url: "@jsr/std__yaml".to_string(),
        };
        assert!(cache.lookup(&key).await.is_none());
    }

    // ============================================================================
    // Service surface
    // ============================================================================

    #[tokio::test]
    async fn health_endpoint_responds() {
        let proxy = proxy_with(Arc::new(MemoryBucket::new()), None, None);
        let resp = send(&proxy, Method::GET, "/up").await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn other_methods_are_rejected() {
        let proxy = proxy_with(seeded_bucket(), None, None);
        let resp = send(&proxy, Method::POST, "/@jsr/std__yaml").await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
