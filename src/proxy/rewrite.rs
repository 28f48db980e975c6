//! Virtual-path rewriting.
//!
//! Some endpoints are not stored under the literal requested path; the
//! registry root, for instance, is backed by a fixed metadata object.
//! The embedding application supplies a hook that inspects the raw,
//! not-yet-decoded path and may substitute another one. It runs exactly
//! once per request, before any decoding, so matching is literal.

use std::sync::Arc;

/// Pure function over the raw request path. `Some(path)` substitutes,
/// `None` passes the original through.
pub type RewriteHook = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Hook mapping the registry root `/` to a fixed object path.
pub fn map_root(object: &str) -> RewriteHook {
    let target = if object.starts_with('/') {
        object.to_string()
    } else {
        format!("/{object}")
    };
    Arc::new(move |raw_path| (raw_path == "/").then(|| target.clone()))
}
