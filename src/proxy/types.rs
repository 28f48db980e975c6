use std::time::Instant;

use artery_store::StoreError;
use rama::http::{Body, Method, Request};
use thiserror::Error;

/// Cache status for request tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Pass,
    Hit,
    Miss,
    Error,
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheStatus::Pass => write!(f, "pass"),
            CacheStatus::Hit => write!(f, "hit"),
            CacheStatus::Miss => write!(f, "miss"),
            CacheStatus::Error => write!(f, "error"),
        }
    }
}

/// Request context for tracking request lifecycle
pub struct RequestContext {
    pub start: Instant,
    pub method: Method,
    pub path: String,
    pub cache: CacheStatus,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            start: Instant::now(),
            method: Method::GET,
            path: String::new(),
            cache: CacheStatus::Pass,
        }
    }
}

impl RequestContext {
    pub fn from_request(req: &Request<Body>) -> Self {
        Self {
            start: Instant::now(),
            method: req.method().clone(),
            path: req.uri().path().to_string(),
            cache: CacheStatus::Pass,
        }
    }
}

/// Failures the pipeline reports to the client. The mapping to HTTP
/// statuses lives in `proxy::response` and nowhere else.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The request path carried percent-encoding that does not decode.
    #[error("malformed request path {path:?}")]
    BadPath { path: String },
    /// The storage backend failed transiently. Never reported as 404.
    #[error(transparent)]
    Store(#[from] StoreError),
}
