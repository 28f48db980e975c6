use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use url::Url;

use crate::store::{ByteStream, ObjectMeta, ObjectStore, StoreError};

/// Characters escaped inside a key path segment. Keys keep their literal
/// `/` as the segment separator; everything else that is not URL-safe is
/// re-encoded on the wire.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Publicly readable object-storage bucket reached over HTTP.
///
/// The bucket is opaque key/value storage: HEAD and GET on
/// `{base}/{key}`, nothing else. 404 from the backend is genuine
/// absence; connection failures, timeouts, and 5xx statuses surface as
/// [`StoreError::Unavailable`].
#[derive(Clone)]
pub struct HttpBucket {
    base: Url,
    client: reqwest::Client,
}

impl HttpBucket {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| StoreError::Unavailable(format!("building bucket client: {err}")))?;
        Ok(Self { base, client })
    }

    fn object_url(&self, key: &str) -> String {
        let encoded = key
            .split('/')
            .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}", self.base.as_str().trim_end_matches('/'), encoded)
    }

    fn meta_from_response(response: &reqwest::Response) -> ObjectMeta {
        let headers = response.headers();
        let size = headers
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());
        let content_type = headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let etag = headers
            .get(reqwest::header::ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        ObjectMeta {
            size,
            content_type,
            etag,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpBucket {
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        let url = self.object_url(key);
        let response = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|err| StoreError::Unavailable(format!("HEAD {url}: {err}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(StoreError::Unavailable(format!(
                "HEAD {url}: bucket returned {status}"
            )));
        }
        Ok(Some(Self::meta_from_response(&response)))
    }

    async fn get(&self, key: &str) -> Result<Option<(ObjectMeta, ByteStream)>, StoreError> {
        let url = self.object_url(key);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| StoreError::Unavailable(format!("GET {url}: {err}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(StoreError::Unavailable(format!(
                "GET {url}: bucket returned {status}"
            )));
        }

        let meta = Self::meta_from_response(&response);
        let stream = response
            .bytes_stream()
            .map_err(std::io::Error::other)
            .boxed();
        Ok(Some((meta, stream)))
    }
}
