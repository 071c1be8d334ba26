use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use bytes::Bytes;
use futures::StreamExt;
use http::{HeaderMap, Method};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use super::{list_entries, BoxStream, Bucket, CannedAcl, GetObject, ListEntry, ObjectHead, PutOptions};
use crate::{config::StorageConfig, connection::Connection, error::BucketError};

const OBJECTS_DIR: &str = "objects";
const META_DIR: &str = "meta";
const TMP_DIR: &str = "tmp";

/// Builder for [`DiskBucket`].
#[derive(Debug, Clone)]
pub struct DiskBucketBuilder {
    root: PathBuf,
    name: String,
    connection: Option<Connection>,
}

impl DiskBucketBuilder {
    /// Sets the directory holding the bucket.
    pub fn destination(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Alias for [`DiskBucketBuilder::destination`].
    pub fn path(self, root: impl Into<PathBuf>) -> Self {
        self.destination(root)
    }

    /// Sets the bucket name used in generated URLs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the connection used to generate URLs.
    pub fn connection(mut self, connection: Connection) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Builds a validated disk bucket.
    pub fn build(self) -> Result<DiskBucket, BucketError> {
        if self.root.as_os_str().is_empty() {
            return Err(BucketError::new("disk bucket root path cannot be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(BucketError::new("disk bucket name cannot be empty"));
        }

        Ok(DiskBucket {
            root: self.root,
            name: self.name,
            connection: self
                .connection
                .unwrap_or_else(|| Connection::connect(&StorageConfig::default())),
        })
    }
}

impl Default for DiskBucketBuilder {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("bucket-storage"),
            name: "local".to_owned(),
            connection: None,
        }
    }
}

/// Bucket persisted in a local directory.
///
/// Object bytes live under `objects/`, their metadata as JSON under `meta/`.
/// Writes go through `tmp/` and are renamed into place. Because keys map to
/// paths, a key cannot be both an object and a prefix of another key.
#[derive(Debug, Clone)]
pub struct DiskBucket {
    root: PathBuf,
    name: String,
    connection: Connection,
}

impl DiskBucket {
    /// Creates a disk bucket builder.
    pub fn builder() -> DiskBucketBuilder {
        DiskBucketBuilder::default()
    }

    /// Returns the bucket root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, BucketError> {
        validate_key(key)?;
        Ok(key
            .split('/')
            .fold(self.root.join(OBJECTS_DIR), |path, segment| path.join(segment)))
    }

    fn meta_path(&self, key: &str) -> Result<PathBuf, BucketError> {
        validate_key(key)?;
        let path = key
            .split('/')
            .fold(self.root.join(META_DIR), |path, segment| path.join(segment));
        let mut file_name = path.file_name().unwrap_or_default().to_os_string();
        file_name.push(".json");
        Ok(path.with_file_name(file_name))
    }

    async fn read_head(&self, key: &str) -> Result<Option<ObjectHead>, BucketError> {
        let path = self.meta_path(key)?;
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|err| BucketError::new(format!("corrupt metadata for `{key}`: {err}")))
    }

    async fn write_head(&self, head: &ObjectHead) -> Result<(), BucketError> {
        let path = self.meta_path(&head.key)?;
        let staged = self.stage_head(head).await?;
        move_into_place(&staged, &path).await
    }

    async fn stage_head(&self, head: &ObjectHead) -> Result<PathBuf, BucketError> {
        let raw = serde_json::to_vec_pretty(head)
            .map_err(|err| BucketError::new(format!("failed to encode metadata: {err}")))?;

        let staged = self.tmp_path().await?;
        if let Err(err) = tokio::fs::write(&staged, raw).await {
            discard(&staged).await;
            return Err(err.into());
        }
        Ok(staged)
    }

    /// Moves a staged object and its metadata into place as one unit.
    ///
    /// An existing object is set aside first and put back if either rename
    /// fails, so bytes and metadata never disagree.
    async fn commit(
        &self,
        key: &str,
        staged_object: &Path,
        head: &ObjectHead,
    ) -> Result<(), BucketError> {
        let object_path = self.object_path(key)?;
        let meta_path = self.meta_path(key)?;

        let staged_head = match self.stage_head(head).await {
            Ok(staged) => staged,
            Err(err) => {
                discard(staged_object).await;
                return Err(err);
            }
        };
        let previous = match self.set_aside(key, &object_path).await {
            Ok(previous) => previous,
            Err(err) => {
                discard(staged_object).await;
                discard(&staged_head).await;
                return Err(err);
            }
        };

        if let Err(err) = move_into_place(staged_object, &object_path).await {
            discard(&staged_head).await;
            restore(previous, &object_path).await;
            return Err(err);
        }
        if let Err(err) = move_into_place(&staged_head, &meta_path).await {
            restore(previous, &object_path).await;
            return Err(err);
        }

        if let Some(previous) = previous {
            discard(&previous).await;
        }
        Ok(())
    }

    async fn set_aside(&self, key: &str, path: &Path) -> Result<Option<PathBuf>, BucketError> {
        match tokio::fs::symlink_metadata(path).await {
            Ok(meta) if meta.is_dir() => Err(BucketError::new(format!(
                "key `{key}` collides with an existing key prefix"
            ))),
            Ok(_) => {
                let aside = self.tmp_path().await?;
                tokio::fs::rename(path, &aside).await?;
                Ok(Some(aside))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn tmp_path(&self) -> Result<PathBuf, BucketError> {
        let tmp_dir = self.root.join(TMP_DIR);
        tokio::fs::create_dir_all(&tmp_dir).await?;
        Ok(tmp_dir.join(Uuid::new_v4().simple().to_string()))
    }

    async fn collect_keys(&self) -> Result<Vec<String>, BucketError> {
        let objects_root = self.root.join(OBJECTS_DIR);
        let mut keys = Vec::new();
        let mut pending = vec![objects_root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Ok(relative) = path.strip_prefix(&objects_root) else {
                    continue;
                };
                let segments: Vec<_> = relative
                    .components()
                    .map(|component| component.as_os_str().to_string_lossy().into_owned())
                    .collect();
                keys.push(segments.join("/"));
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn cleanup_empty_dirs(&self, path: &Path, base: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == base || !dir.starts_with(base) {
                break;
            }
            // Only succeeds for empty directories.
            if tokio::fs::remove_dir(dir).await.is_err() {
                break;
            }
            #[cfg(feature = "tracing")]
            tracing::debug!(path = %dir.display(), "disk bucket: removed empty directory");
            current = dir.parent();
        }
    }
}

#[async_trait::async_trait]
impl Bucket for DiskBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<Vec<ListEntry>, BucketError> {
        let keys = self.collect_keys().await?;
        Ok(list_entries(keys.iter().map(String::as_str), prefix, delimiter))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectHead>, BucketError> {
        if key.is_empty() {
            return Ok(None);
        }
        self.read_head(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<GetObject>, BucketError> {
        if key.is_empty() {
            return Ok(None);
        }
        let Some(head) = self.read_head(key).await? else {
            return Ok(None);
        };

        let file = match tokio::fs::File::open(self.object_path(key)?).await {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        Ok(Some(GetObject {
            head,
            body: ReaderStream::new(file)
                .map(|chunk| chunk.map_err(BucketError::from))
                .boxed(),
        }))
    }

    async fn put(
        &self,
        key: &str,
        mut body: BoxStream<'_, Result<Bytes, BucketError>>,
        options: PutOptions,
    ) -> Result<ObjectHead, BucketError> {
        validate_key(key)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            key = key,
            root = %self.root.display(),
            "disk bucket: begin streaming store"
        );

        let tmp_path = self.tmp_path().await?;
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        let mut written = 0u64;

        let copied = async {
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                written = written.saturating_add(chunk.len() as u64);
            }
            file.flush().await?;
            Ok::<(), BucketError>(())
        }
        .await;
        drop(file);

        if let Err(err) = copied {
            discard(&tmp_path).await;
            return Err(err);
        }

        let mut head = ObjectHead::new(key);
        head.apply_headers(&options.headers);
        head.size = written;
        head.acl = options.acl;
        head.reduced_redundancy = options.reduced_redundancy;
        head.encrypted = options.encrypt;
        self.commit(key, &tmp_path, &head).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            key = key,
            size = written,
            "disk bucket: committed object and metadata"
        );
        Ok(head)
    }

    async fn copy_in_place(
        &self,
        key: &str,
        headers: HeaderMap,
        encrypt: bool,
    ) -> Result<ObjectHead, BucketError> {
        let mut head = self
            .read_head(key)
            .await?
            .ok_or_else(|| BucketError::not_found(key))?;

        head.apply_headers(&headers);
        head.acl = CannedAcl::Private;
        head.encrypted = encrypt;
        head.touch();
        self.write_head(&head).await?;
        Ok(head)
    }

    async fn set_acl(&self, key: &str, acl: CannedAcl) -> Result<(), BucketError> {
        let mut head = self
            .read_head(key)
            .await?
            .ok_or_else(|| BucketError::not_found(key))?;
        head.acl = acl;
        self.write_head(&head).await
    }

    async fn delete(&self, key: &str) -> Result<(), BucketError> {
        // The bucket root is never an object.
        if key.is_empty() {
            return Ok(());
        }
        let object_path = self.object_path(key)?;
        let meta_path = self.meta_path(key)?;

        for path in [&object_path, &meta_path] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }

        self.cleanup_empty_dirs(&object_path, &self.root.join(OBJECTS_DIR))
            .await;
        self.cleanup_empty_dirs(&meta_path, &self.root.join(META_DIR))
            .await;

        #[cfg(feature = "tracing")]
        tracing::debug!(key = key, "disk bucket: deleted object");
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

fn validate_key(key: &str) -> Result<(), BucketError> {
    let valid = !key.is_empty()
        && key
            .split('/')
            .all(|segment| !matches!(segment, "" | "." | ".."));

    if valid {
        Ok(())
    } else {
        Err(BucketError::InvalidKey {
            key: key.to_owned(),
        })
    }
}

async fn move_into_place(from: &Path, to: &Path) -> Result<(), BucketError> {
    let moved = async {
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(from, to).await
    }
    .await;

    if let Err(err) = moved {
        discard(from).await;
        return Err(err.into());
    }
    Ok(())
}

/// Puts a set-aside object back, or removes the new one when there was none.
async fn restore(previous: Option<PathBuf>, path: &Path) {
    match previous {
        Some(previous) => {
            if tokio::fs::rename(&previous, path).await.is_err() {
                discard(&previous).await;
            }
        }
        None => discard(path).await,
    }
}

async fn discard(path: &Path) {
    let _ = tokio::fs::remove_file(path).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_keys_with_empty_or_relative_segments() {
        for key in ["", "/a", "a/", "a//b", "./a", "a/../b"] {
            assert!(
                matches!(validate_key(key), Err(BucketError::InvalidKey { .. })),
                "{key:?} should be rejected"
            );
        }
        assert!(validate_key("a/b.txt").is_ok());
    }

    #[test]
    fn metadata_lives_in_a_separate_tree() {
        let bucket = DiskBucket::builder()
            .destination("/srv/bucket")
            .build()
            .unwrap();
        assert_eq!(
            bucket.object_path("a/b.txt").unwrap(),
            PathBuf::from("/srv/bucket/objects/a/b.txt")
        );
        assert_eq!(
            bucket.meta_path("a/b.txt").unwrap(),
            PathBuf::from("/srv/bucket/meta/a/b.txt.json")
        );
    }

    #[test]
    fn builder_rejects_empty_root() {
        let err = DiskBucket::builder().destination("").build().unwrap_err();
        assert!(err.to_string().contains("root path cannot be empty"));
    }
}
