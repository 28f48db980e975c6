//! Request-path to storage-key resolution.
//!
//! npm clients disagree on how a scoped name travels on the wire: some
//! send `/@scope/name`, others `/@scope%2Fname`. Both must land on the
//! same bucket key, so the whole remainder is percent-decoded exactly
//! once and used verbatim.

use percent_encoding::percent_decode_str;

use super::types::ProxyError;

/// Turns a raw request path into the canonical storage key.
///
/// Strips the leading `/`; if the remainder carries percent-encoded
/// octets it is decoded once. No further segment manipulation happens —
/// the bucket's key namespace already matches the scoped-package naming
/// the registry publishes under.
///
/// Callers run the rewrite hook on the raw path *before* this, so
/// virtual-path matching stays literal.
pub fn resolve_key(raw_path: &str) -> Result<String, ProxyError> {
    let remainder = raw_path.strip_prefix('/').unwrap_or(raw_path);
    if !remainder.contains('%') {
        return Ok(remainder.to_string());
    }
    match percent_decode_str(remainder).decode_utf8() {
        Ok(decoded) => Ok(decoded.into_owned()),
        Err(_) => Err(ProxyError::BadPath {
            path: raw_path.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================================
    // Canonical form equivalence
    // ============================================================================

    #[test]
    fn literal_separator_resolves_verbatim() {
        assert_eq!(resolve_key("/@jsr/std__yaml").unwrap(), "@jsr/std__yaml");
    }

    #[test]
    fn encoded_separator_resolves_to_same_key() {
        assert_eq!(resolve_key("/@jsr%2Fstd__yaml").unwrap(), "@jsr/std__yaml");
    }

    #[test]
    fn encoded_and_literal_forms_agree() {
        let literal = resolve_key("/@jsr/std__yaml/1.0.0").unwrap();
        let encoded = resolve_key("/@jsr%2Fstd__yaml/1.0.0").unwrap();
        assert_eq!(literal, encoded);
    }

    #[test]
    fn lowercase_hex_digits_decode_too() {
        assert_eq!(resolve_key("/@jsr%2fstd__yaml").unwrap(), "@jsr/std__yaml");
    }

    // ============================================================================
    // Version paths
    // ============================================================================

    #[test]
    fn version_path_keeps_segments() {
        assert_eq!(
            resolve_key("/@jsr/std__yaml/1.2.3").unwrap(),
            "@jsr/std__yaml/1.2.3"
        );
    }

    // ============================================================================
    // Edge cases
    // ============================================================================

    #[test]
    fn root_path_yields_empty_key() {
        assert_eq!(resolve_key("/").unwrap(), "");
    }

    #[test]
    fn empty_path_yields_empty_key() {
        assert_eq!(resolve_key("").unwrap(), "");
    }

    #[test]
    fn missing_leading_slash_still_resolves() {
        assert_eq!(resolve_key("@jsr/std__yaml").unwrap(), "@jsr/std__yaml");
    }

    #[test]
    fn plain_path_is_untouched() {
        assert_eq!(resolve_key("/root.json").unwrap(), "root.json");
    }

    #[test]
    fn decoding_happens_exactly_once() {
        // %252F decodes to the literal text "%2F", not to "/".
        assert_eq!(resolve_key("/@jsr%252Fstd__yaml").unwrap(), "@jsr%2Fstd__yaml");
    }

    // ============================================================================
    // Error paths
    // ============================================================================

    #[test]
    fn invalid_utf8_after_decode_is_bad_path() {
        let err = resolve_key("/@jsr/%ff").unwrap_err();
        assert!(matches!(err, ProxyError::BadPath { .. }));
    }

    #[test]
    fn bad_path_reports_the_raw_path() {
        match resolve_key("/%FF%FE").unwrap_err() {
            ProxyError::BadPath { path } => assert_eq!(path, "/%FF%FE"),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
