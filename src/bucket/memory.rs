use std::{collections::BTreeMap, sync::Arc, time::Duration};

use bytes::Bytes;
use futures::{stream, StreamExt};
use http::{HeaderMap, Method};
use tokio::sync::RwLock;

use super::{list_entries, BoxStream, Bucket, CannedAcl, GetObject, ListEntry, ObjectHead, PutOptions};
use crate::{connection::Connection, error::BucketError};

#[derive(Debug, Clone)]
struct MemoryObject {
    head: ObjectHead,
    body: Bytes,
}

/// In-memory bucket keyed by object key.
///
/// Clones share the same objects, so a test can keep a handle while the
/// storage adapter owns another.
#[derive(Debug, Clone)]
pub struct MemoryBucket {
    name: String,
    connection: Connection,
    objects: Arc<RwLock<BTreeMap<String, MemoryObject>>>,
}

impl MemoryBucket {
    /// Creates an empty bucket bound to `connection`.
    pub fn new(name: impl Into<String>, connection: Connection) -> Self {
        Self {
            name: name.into(),
            connection,
            objects: Arc::default(),
        }
    }

    /// Returns the stored (possibly compressed) bytes of `key`.
    pub async fn raw_bytes(&self, key: &str) -> Option<Bytes> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|object| object.body.clone())
    }

    /// Returns all stored keys in order.
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    /// Returns the current number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Returns `true` when no objects are currently stored.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl Bucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<Vec<ListEntry>, BucketError> {
        let objects = self.objects.read().await;
        Ok(list_entries(
            objects.keys().map(String::as_str),
            prefix,
            delimiter,
        ))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectHead>, BucketError> {
        Ok(self
            .objects
            .read()
            .await
            .get(key)
            .map(|object| object.head.clone()))
    }

    async fn get(&self, key: &str) -> Result<Option<GetObject>, BucketError> {
        let Some(object) = self.objects.read().await.get(key).cloned() else {
            return Ok(None);
        };

        Ok(Some(GetObject {
            head: object.head,
            body: stream::iter([Ok::<_, BucketError>(object.body)]).boxed(),
        }))
    }

    async fn put(
        &self,
        key: &str,
        mut body: BoxStream<'_, Result<Bytes, BucketError>>,
        options: PutOptions,
    ) -> Result<ObjectHead, BucketError> {
        let mut content = Vec::new();
        while let Some(chunk) = body.next().await {
            content.extend_from_slice(&chunk?);
        }

        let mut head = ObjectHead::new(key);
        head.apply_headers(&options.headers);
        head.size = content.len() as u64;
        head.acl = options.acl;
        head.reduced_redundancy = options.reduced_redundancy;
        head.encrypted = options.encrypt;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            bucket = self.name.as_str(),
            key = key,
            size = head.size,
            "memory bucket: stored object"
        );

        self.objects.write().await.insert(
            key.to_owned(),
            MemoryObject {
                head: head.clone(),
                body: Bytes::from(content),
            },
        );
        Ok(head)
    }

    async fn copy_in_place(
        &self,
        key: &str,
        headers: HeaderMap,
        encrypt: bool,
    ) -> Result<ObjectHead, BucketError> {
        let mut objects = self.objects.write().await;
        let object = objects
            .get_mut(key)
            .ok_or_else(|| BucketError::not_found(key))?;

        object.head.apply_headers(&headers);
        object.head.acl = CannedAcl::Private;
        object.head.encrypted = encrypt;
        object.head.touch();
        Ok(object.head.clone())
    }

    async fn set_acl(&self, key: &str, acl: CannedAcl) -> Result<(), BucketError> {
        let mut objects = self.objects.write().await;
        let object = objects
            .get_mut(key)
            .ok_or_else(|| BucketError::not_found(key))?;
        object.head.acl = acl;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BucketError> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    fn signed_url(
        &self,
        method: &Method,
        key: &str,
        expires_in: Duration,
        query_auth: bool,
    ) -> Result<String, BucketError> {
        self.connection
            .generate_url(method, &self.name, key, expires_in, query_auth)
    }
}
