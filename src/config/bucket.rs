use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use serde::Deserialize;
use url::Url;

/// Where published artifacts live. With a `url` the bucket is reached
/// over HTTP; without one a local directory stands in (dev and tests).
#[derive(Debug, Clone, Deserialize)]
pub struct BucketConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_bucket_path")]
    pub path: PathBuf,
    /// Object served for the registry root `/`, e.g. "root.json".
    #[serde(default)]
    pub root_object: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl BucketConfig {
    pub fn normalize_paths(&mut self, base_dir: &Path) {
        if self.path.is_relative() {
            self.path = base_dir.join(&self.path);
        }
    }

    pub fn backend(&self) -> Result<BucketBackend> {
        if let Some(raw_url) = &self.url {
            let url = Url::parse(raw_url.trim())
                .map_err(|err| anyhow::anyhow!("invalid bucket url {raw_url}: {err}"))?;
            if url.scheme() != "https" && url.scheme() != "http" {
                bail!("unsupported bucket url scheme {}", url.scheme());
            }
            Ok(BucketBackend::Http { url })
        } else {
            Ok(BucketBackend::Filesystem {
                path: self.path.clone(),
            })
        }
    }
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            url: None,
            path: default_bucket_path(),
            root_object: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum BucketBackend {
    Http { url: Url },
    Filesystem { path: PathBuf },
}

fn default_bucket_path() -> PathBuf {
    PathBuf::from("./artifacts")
}

fn default_timeout_secs() -> u64 {
    30
}
