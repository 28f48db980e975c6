use serde::Deserialize;

/// Edge-cache policy. The cache is purely an optimization; disabling it
/// changes nothing observable except bucket traffic.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Entries are trusted for this long; no re-validation.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Bodies above this size stream through uncached.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_max_entries() -> usize {
    1024
}

fn default_max_body_bytes() -> u64 {
    1024 * 1024
}
