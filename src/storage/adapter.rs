use std::{
    io::{Seek, Write},
    time::Duration,
};

use chrono::{DateTime, NaiveDateTime};
use futures::StreamExt;
use http::Method;

use super::{BucketFile, FileStorage, Listing, OpenMode};
use crate::{
    bucket::{Bucket, CannedAcl, ListEntry, MemoryBucket, ObjectHead, PutOptions},
    config::StorageConfig,
    connection::Connection,
    error::{ConfigError, StorageError},
    key::{escape_uri_path, normalize_name, KeyMapper},
    upload::{prepare_upload, temporary_buffer, Content, CONTENT_ENCODING_GZIP},
};

/// File storage backed by an object-storage bucket.
///
/// Holds one validated [`StorageConfig`] and one bucket handle for its whole
/// lifetime. Every operation awaits its remote calls in order and surfaces
/// remote failures without retrying.
#[derive(Debug, Clone)]
pub struct BucketStorage<B> {
    config: StorageConfig,
    keys: KeyMapper,
    bucket: B,
}

impl<B: Bucket> BucketStorage<B> {
    /// Creates an adapter over `bucket` after validating `config`.
    pub fn new(config: StorageConfig, bucket: B) -> Result<Self, ConfigError> {
        config.validate()?;
        let keys = KeyMapper::new(&config.key_prefix).map_err(|_| ConfigError::InvalidKeyPrefix {
            prefix: config.key_prefix.clone(),
        })?;

        Ok(Self {
            config,
            keys,
            bucket,
        })
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Returns the underlying bucket.
    pub fn bucket(&self) -> &B {
        &self.bucket
    }

    /// Returns the key mapper derived from the configured prefix.
    pub fn key_mapper(&self) -> &KeyMapper {
        &self.keys
    }

    /// Returns the `Cache-Control` value written with objects.
    pub fn cache_control(&self) -> String {
        self.config.cache_control()
    }

    /// Returns the ACL every object should carry: private with bucket auth, public otherwise.
    pub fn canonical_acl(&self) -> CannedAcl {
        if self.config.bucket_auth {
            CannedAcl::Private
        } else {
            CannedAcl::PublicRead
        }
    }

    /// Returns the normalized form of a logical name.
    pub fn valid_name(&self, name: &str) -> Result<String, StorageError> {
        normalize_name(name)
    }

    /// Returns the object key for a logical name.
    pub fn key_for(&self, name: &str) -> Result<String, StorageError> {
        self.keys.key(name)
    }

    pub(crate) async fn head(&self, name: &str) -> Result<ObjectHead, StorageError> {
        let key = self.key_for(name)?;
        self.bucket
            .head(&key)
            .await
            .map_err(|err| StorageError::from_bucket(name, err))?
            .ok_or_else(|| StorageError::NotFound {
                name: name.to_owned(),
            })
    }

    /// Downloads `name` into a temporary buffer and wraps it in a read handle.
    pub(crate) async fn fetch(&self, name: &str) -> Result<BucketFile, StorageError> {
        let key = self.key_for(name)?;
        let object = self
            .bucket
            .get(&key)
            .await
            .map_err(|err| StorageError::from_bucket(name, err))?
            .ok_or_else(|| StorageError::NotFound {
                name: name.to_owned(),
            })?;

        let mut buffer = temporary_buffer();
        let mut body = object.body;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|err| StorageError::from_bucket(name, err))?;
            buffer.write_all(&chunk)?;
        }
        buffer.rewind()?;

        let gzip = object.head.content_encoding.as_deref() == Some(CONTENT_ENCODING_GZIP);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            name = name,
            key = key.as_str(),
            size = object.head.size,
            gzip = gzip,
            "storage: opened file"
        );

        Ok(BucketFile::new(name, buffer, gzip)?)
    }
}

impl BucketStorage<MemoryBucket> {
    /// Creates an adapter over a fresh in-memory bucket named after `config.bucket_name`.
    pub fn in_memory(config: StorageConfig) -> Result<Self, ConfigError> {
        let bucket = Connection::connect(&config).memory_bucket(&config.bucket_name);
        Self::new(config, bucket)
    }
}

#[async_trait::async_trait]
impl<B: Bucket> FileStorage for BucketStorage<B> {
    type File = BucketFile;

    async fn open(&self, name: &str, mode: OpenMode) -> Result<BucketFile, StorageError> {
        if !mode.is_read_only() {
            return Err(StorageError::UnsupportedMode {
                mode: mode.to_string(),
            });
        }
        self.fetch(name).await
    }

    async fn save(&self, name: &str, content: Content) -> Result<String, StorageError> {
        let name = self.valid_name(name)?;
        if name.is_empty() {
            return Err(StorageError::InvalidPath { name });
        }
        let key = self.key_for(&name)?;
        let envelope = prepare_upload(&name, content, &self.config)?;

        let options = PutOptions {
            acl: self.canonical_acl(),
            headers: envelope.headers,
            reduced_redundancy: self.config.reduced_redundancy,
            encrypt: self.config.encrypt,
        };
        #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
        let stored = self
            .bucket
            .put(&key, Box::pin(envelope.body), options)
            .await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            name = name.as_str(),
            key = key.as_str(),
            size = stored.size,
            "storage: saved file"
        );

        Ok(name)
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        let key = self.key_for(name)?;
        self.bucket.delete(&key).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(name = name, key = key.as_str(), "storage: deleted file");
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        let key = self.key_for(name)?;
        let entries = self.bucket.list(&key, Some("/")).await?;
        if key.is_empty() {
            return Ok(!entries.is_empty());
        }

        let dir = format!("{key}/");
        Ok(entries.iter().any(|entry| match entry {
            ListEntry::Object(object) => *object == key,
            ListEntry::Prefix(prefix) => *prefix == dir,
        }))
    }

    async fn listdir(&self, path: &str) -> Result<Listing, StorageError> {
        let dir = self.key_for(path)?;
        let prefix = if dir.is_empty() {
            dir
        } else {
            format!("{dir}/")
        };

        let mut listing = Listing::default();
        for entry in self.bucket.list(&prefix, Some("/")).await? {
            let Some(child) = entry.name().strip_prefix(prefix.as_str()) else {
                continue;
            };
            match &entry {
                ListEntry::Object(_) if !child.is_empty() => {
                    listing.files.insert(child.to_owned());
                }
                ListEntry::Prefix(_) => {
                    let child = child.trim_end_matches('/');
                    if !child.is_empty() {
                        listing.directories.insert(child.to_owned());
                    }
                }
                ListEntry::Object(_) => {}
            }
        }
        Ok(listing)
    }

    async fn size(&self, name: &str) -> Result<u64, StorageError> {
        Ok(self.head(name).await?.size)
    }

    fn url(&self, name: &str) -> Result<String, StorageError> {
        if let Some(base) = self.config.public_base_url() {
            let name = self.valid_name(name)?;
            return Ok(format!(
                "{}/{}",
                base.trim_end_matches('/'),
                escape_uri_path(&name)
            ));
        }

        let key = self.key_for(name)?;
        Ok(self.bucket.signed_url(
            &Method::GET,
            &key,
            Duration::from_secs(self.config.max_age_seconds),
            self.config.bucket_auth,
        )?)
    }

    async fn modified_time(&self, name: &str) -> Result<NaiveDateTime, StorageError> {
        let head = self.head(name).await?;
        DateTime::parse_from_rfc2822(&head.last_modified)
            .map(|timestamp| timestamp.naive_utc())
            .map_err(|_| StorageError::InvalidTimestamp {
                name: name.to_owned(),
                value: head.last_modified,
            })
    }
}
