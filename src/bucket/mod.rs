//! Remote bucket abstraction and built-in implementations.

use std::{collections::BTreeMap, fmt, pin::Pin, time::Duration};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use http::{header, HeaderMap, Method};
use serde::{Deserialize, Serialize};

use crate::error::BucketError;

/// Directory-backed bucket implementation.
pub mod disk;
/// In-memory bucket implementation.
pub mod memory;
pub use disk::{DiskBucket, DiskBucketBuilder};
pub use memory::MemoryBucket;

/// Boxed stream type used for object bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Predefined access-control policy applied to an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CannedAcl {
    /// Readable only with credentials.
    #[default]
    Private,
    /// Readable by anyone.
    PublicRead,
}

impl CannedAcl {
    /// Returns the wire name of the policy.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::PublicRead => "public-read",
        }
    }
}

impl fmt::Display for CannedAcl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHead {
    /// Object key.
    pub key: String,
    /// Stored size in bytes (after any compression).
    pub size: u64,
    /// Recorded `Content-Type`.
    pub content_type: String,
    /// Recorded `Content-Encoding`, if any.
    pub content_encoding: Option<String>,
    /// Recorded `Cache-Control`, if any.
    pub cache_control: Option<String>,
    /// Last modification as an HTTP date.
    pub last_modified: String,
    /// Remaining user metadata headers, keyed by lowercase header name.
    pub metadata: BTreeMap<String, String>,
    /// Access policy of the object.
    pub acl: CannedAcl,
    /// Object lives in the reduced-redundancy class.
    pub reduced_redundancy: bool,
    /// Object is encrypted at rest.
    pub encrypted: bool,
}

impl ObjectHead {
    pub(crate) fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size: 0,
            content_type: DEFAULT_CONTENT_TYPE.to_owned(),
            content_encoding: None,
            cache_control: None,
            last_modified: http_date(Utc::now()),
            metadata: BTreeMap::new(),
            acl: CannedAcl::Private,
            reduced_redundancy: false,
            encrypted: false,
        }
    }

    /// Replaces content headers and user metadata with `headers`.
    pub(crate) fn apply_headers(&mut self, headers: &HeaderMap) {
        self.content_type = header_string(headers, &header::CONTENT_TYPE)
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_owned());
        self.content_encoding = header_string(headers, &header::CONTENT_ENCODING);
        self.cache_control = header_string(headers, &header::CACHE_CONTROL);
        self.metadata = headers
            .iter()
            .filter(|(name, _)| {
                ![
                    header::CONTENT_TYPE,
                    header::CONTENT_ENCODING,
                    header::CACHE_CONTROL,
                ]
                .contains(*name)
            })
            .map(|(name, value)| {
                (
                    name.as_str().to_owned(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
    }

    pub(crate) fn touch(&mut self) {
        self.last_modified = http_date(Utc::now());
    }
}

/// One entry of a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListEntry {
    /// An object key.
    Object(String),
    /// A common key prefix, ending with the delimiter.
    Prefix(String),
}

impl ListEntry {
    /// Returns the key or prefix.
    pub fn name(&self) -> &str {
        match self {
            Self::Object(name) | Self::Prefix(name) => name,
        }
    }
}

/// Object fetched from a bucket.
pub struct GetObject {
    /// Object metadata.
    pub head: ObjectHead,
    /// Stored object bytes.
    pub body: BoxStream<'static, Result<Bytes, BucketError>>,
}

impl fmt::Debug for GetObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetObject")
            .field("head", &self.head)
            .field("body", &"<stream>")
            .finish()
    }
}

/// Options for a single object write.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Access policy to apply.
    pub acl: CannedAcl,
    /// Content headers and metadata to store.
    pub headers: HeaderMap,
    /// Use the reduced-redundancy storage class.
    pub reduced_redundancy: bool,
    /// Encrypt the object at rest.
    pub encrypt: bool,
}

/// Async trait abstraction over a remote object-storage bucket.
#[async_trait::async_trait]
pub trait Bucket: Send + Sync + 'static {
    /// Returns the bucket name.
    fn name(&self) -> &str;

    /// Lists keys starting with `prefix`.
    ///
    /// With a delimiter, keys containing it after the prefix collapse into one
    /// [`ListEntry::Prefix`] per distinct leading segment.
    async fn list(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<Vec<ListEntry>, BucketError>;

    /// Fetches object metadata, or `None` when the key is absent.
    async fn head(&self, key: &str) -> Result<Option<ObjectHead>, BucketError>;

    /// Fetches an object, or `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<GetObject>, BucketError>;

    /// Writes a complete object in one request, replacing any existing one.
    async fn put(
        &self,
        key: &str,
        body: BoxStream<'_, Result<Bytes, BucketError>>,
        options: PutOptions,
    ) -> Result<ObjectHead, BucketError>;

    /// Copies an object onto itself with new headers, leaving the content untouched.
    ///
    /// The copy does not preserve the object's ACL; it is reset to private.
    async fn copy_in_place(
        &self,
        key: &str,
        headers: HeaderMap,
        encrypt: bool,
    ) -> Result<ObjectHead, BucketError>;

    /// Applies a canned ACL to an existing object.
    async fn set_acl(&self, key: &str, acl: CannedAcl) -> Result<(), BucketError>;

    /// Deletes an object. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), BucketError>;

    /// Generates a URL for `method` on `key`.
    fn signed_url(
        &self,
        method: &Method,
        key: &str,
        expires_in: Duration,
        query_auth: bool,
    ) -> Result<String, BucketError>;
}

/// Builds a listing from sorted keys the way object stores group by delimiter.
pub(crate) fn list_entries<'a>(
    keys: impl IntoIterator<Item = &'a str>,
    prefix: &str,
    delimiter: Option<&str>,
) -> Vec<ListEntry> {
    let mut entries = Vec::new();
    let mut last_prefix: Option<String> = None;

    for key in keys {
        let Some(rest) = key.strip_prefix(prefix) else {
            continue;
        };

        let common = delimiter
            .filter(|delimiter| !delimiter.is_empty())
            .and_then(|delimiter| {
                rest.find(delimiter)
                    .map(|index| format!("{prefix}{}", &rest[..index + delimiter.len()]))
            });

        match common {
            Some(common) if last_prefix.as_deref() == Some(common.as_str()) => {}
            Some(common) => {
                last_prefix = Some(common.clone());
                entries.push(ListEntry::Prefix(common));
            }
            None => entries.push(ListEntry::Object(key.to_owned())),
        }
    }

    entries
}

/// Formats a timestamp as an RFC 7231 HTTP date.
pub(crate) fn http_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn header_string(headers: &HeaderMap, name: &header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    #[test]
    fn listing_groups_keys_under_common_prefixes() {
        let keys = ["a/b.txt", "a/c/d.txt", "ab.txt", "e.txt"];
        let entries = list_entries(keys, "", Some("/"));
        assert_eq!(
            entries,
            vec![
                ListEntry::Prefix("a/".to_owned()),
                ListEntry::Object("ab.txt".to_owned()),
                ListEntry::Object("e.txt".to_owned()),
            ]
        );

        let nested = list_entries(keys, "a/", Some("/"));
        assert_eq!(
            nested,
            vec![
                ListEntry::Object("a/b.txt".to_owned()),
                ListEntry::Prefix("a/c/".to_owned()),
            ]
        );
    }

    #[test]
    fn listing_without_delimiter_is_flat() {
        let keys = ["a/b.txt", "a/c/d.txt", "e.txt"];
        let entries = list_entries(keys, "a", None);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|entry| matches!(entry, ListEntry::Object(_))));
    }

    #[test]
    fn applying_headers_splits_content_headers_from_metadata() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/css"));
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public,max-age=60"),
        );
        headers.insert("x-goog-meta-owner", HeaderValue::from_static("ops"));

        let mut head = ObjectHead::new("site.css");
        head.apply_headers(&headers);

        assert_eq!(head.content_type, "text/css");
        assert_eq!(head.content_encoding.as_deref(), Some("gzip"));
        assert_eq!(head.cache_control.as_deref(), Some("public,max-age=60"));
        assert_eq!(
            head.metadata.get("x-goog-meta-owner").map(String::as_str),
            Some("ops")
        );
        assert_eq!(head.metadata.len(), 1);
    }

    #[test]
    fn http_dates_use_gmt() {
        let timestamp = DateTime::parse_from_rfc3339("2015-10-21T07:28:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(http_date(timestamp), "Wed, 21 Oct 2015 07:28:00 GMT");
    }
}
