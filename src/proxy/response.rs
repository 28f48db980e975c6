use anyhow::{Result, anyhow};
use artery_store::{ByteStream, ObjectMeta};
use rama::http::{Body, Response, StatusCode, header};

use super::cache::CachedResponse;
use super::types::ProxyError;

/// Fallback when the stored object carries no content type.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Published artifacts are immutable once stored.
const ARTIFACT_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Responds with plain text
pub fn respond_text(status: StatusCode, body: &str) -> Result<Response<Body>> {
    Response::builder()
        .status(status)
        .header(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("text/plain; charset=utf-8"),
        )
        .body(Body::from(body.to_owned()))
        .map_err(Into::into)
}

/// Responds with an npm-style JSON error object
pub fn respond_error(status: StatusCode, message: &str) -> Result<Response<Body>> {
    let body = serde_json::json!({
        "error": message
    });
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body)?))
        .map_err(Into::into)
}

/// 404 for a key the bucket does not hold: empty body, no content type.
pub fn not_found() -> Result<Response<Body>> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Body::empty())
        .map_err(Into::into)
}

/// 200 for a stored object. `body` is `None` for HEAD; for GET the
/// stream is forwarded as-is, never materialized whole.
pub fn object_response(meta: &ObjectMeta, body: Option<ByteStream>) -> Result<Response<Body>> {
    let mut builder = Response::builder().status(StatusCode::OK);
    {
        let headers = builder
            .headers_mut()
            .ok_or_else(|| anyhow!("failed to get headers for object response"))?;
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_str(
                meta.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE),
            )?,
        );
        if let Some(size) = meta.size {
            headers.insert(
                header::CONTENT_LENGTH,
                header::HeaderValue::from_str(&size.to_string())?,
            );
        }
        if let Some(etag) = &meta.etag {
            headers.insert(header::ETAG, header::HeaderValue::from_str(etag)?);
        }
        headers.insert(
            header::CACHE_CONTROL,
            header::HeaderValue::from_static(ARTIFACT_CACHE_CONTROL),
        );
    }

    let body = match body {
        Some(stream) => Body::from_stream(stream),
        None => Body::empty(),
    };
    builder.body(body).map_err(Into::into)
}

/// Replays a previously built response from the edge cache.
pub fn from_cached(entry: &CachedResponse) -> Result<Response<Body>> {
    let mut builder = Response::builder().status(entry.status);
    {
        let headers = builder
            .headers_mut()
            .ok_or_else(|| anyhow!("failed to get headers for cached response"))?;
        if let Some(content_type) = &entry.content_type {
            headers.insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_str(content_type)?,
            );
        }
        if let Some(length) = entry.content_length {
            headers.insert(
                header::CONTENT_LENGTH,
                header::HeaderValue::from_str(&length.to_string())?,
            );
        }
        if let Some(etag) = &entry.etag {
            headers.insert(header::ETAG, header::HeaderValue::from_str(etag)?);
        }
        headers.insert(
            header::CACHE_CONTROL,
            header::HeaderValue::from_static(ARTIFACT_CACHE_CONTROL),
        );
    }
    builder.body(Body::from(entry.body.clone())).map_err(Into::into)
}

/// Builds the cache entry for a successful response. The content type
/// stored is the effective one (after the binary fallback), so a replay
/// carries exactly the headers a fresh response would.
pub fn cache_entry(meta: &ObjectMeta, body: bytes::Bytes) -> CachedResponse {
    CachedResponse {
        status: StatusCode::OK,
        content_type: Some(
            meta.content_type
                .clone()
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        ),
        content_length: meta.size,
        etag: meta.etag.clone(),
        body,
    }
}

/// Sole mapping from pipeline errors to HTTP statuses.
pub fn error_response(err: &ProxyError) -> Result<Response<Body>> {
    match err {
        ProxyError::BadPath { .. } => {
            respond_error(StatusCode::BAD_REQUEST, "malformed request path")
        }
        // Transient backend failure. Reported as a gateway error so
        // package managers never cache a false "does not exist".
        ProxyError::Store(_) => Response::builder()
            .status(StatusCode::BAD_GATEWAY)
            .body(Body::empty())
            .map_err(Into::into),
    }
}
