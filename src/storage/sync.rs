use std::collections::VecDeque;

use futures::{future, stream, Stream, TryStreamExt};
use http::{header, HeaderMap, HeaderName};

use super::{BucketStorage, FileStorage};
use crate::{
    bucket::Bucket,
    error::StorageError,
    key::join_path,
    upload::{apply_metadata, header_value},
};

/// Pending work of one sweep: directories still to list and files of the
/// current directory still to update.
struct Sweep {
    directories: Vec<String>,
    files: VecDeque<String>,
}

impl<B: Bucket> BucketStorage<B> {
    /// Rewrites metadata and ACL of every stored file to match the current
    /// configuration, yielding each processed name.
    ///
    /// The walk is depth-first, files before subdirectories. Object contents
    /// are never touched, and each call starts a fresh walk from the root.
    pub fn sync_metadata_iter(&self) -> impl Stream<Item = Result<String, StorageError>> + Send + '_ {
        let sweep = Sweep {
            directories: vec![String::new()],
            files: VecDeque::new(),
        };

        stream::try_unfold(sweep, move |mut sweep| async move {
            loop {
                if let Some(name) = sweep.files.pop_front() {
                    self.sync_file(&name).await?;
                    return Ok::<_, StorageError>(Some((name, sweep)));
                }

                let Some(dir) = sweep.directories.pop() else {
                    return Ok(None);
                };
                let listing = self.listdir(&dir).await?;
                sweep
                    .files
                    .extend(listing.files.iter().map(|file| join_path(&dir, file)));
                // Reversed so the stack pops subdirectories in listing order.
                sweep.directories.extend(
                    listing
                        .directories
                        .iter()
                        .rev()
                        .map(|child| join_path(&dir, child)),
                );
            }
        })
    }

    /// Runs [`BucketStorage::sync_metadata_iter`] to completion.
    pub async fn sync_metadata(&self) -> Result<(), StorageError> {
        self.sync_metadata_iter()
            .try_for_each(|_| future::ready(Ok(())))
            .await
    }

    async fn sync_file(&self, name: &str) -> Result<(), StorageError> {
        let key = self.key_for(name)?;
        let head = self.head(name).await?;

        let mut headers = HeaderMap::new();
        for (metadata, value) in &head.metadata {
            let header_name =
                HeaderName::from_bytes(metadata.as_bytes()).map_err(|_| {
                    StorageError::InvalidHeader {
                        header: metadata.clone(),
                    }
                })?;
            headers.insert(header_name, header_value(metadata, value)?);
        }
        headers.insert(
            header::CONTENT_TYPE,
            header_value(header::CONTENT_TYPE.as_str(), &head.content_type)?,
        );
        if let Some(encoding) = &head.content_encoding {
            headers.insert(
                header::CONTENT_ENCODING,
                header_value(header::CONTENT_ENCODING.as_str(), encoding)?,
            );
        }
        headers.insert(
            header::CACHE_CONTROL,
            header_value(header::CACHE_CONTROL.as_str(), &self.cache_control())?,
        );
        apply_metadata(&mut headers, name, self.config())?;

        self.bucket()
            .copy_in_place(&key, headers, self.config().encrypt)
            .await
            .map_err(|err| StorageError::from_bucket(name, err))?;
        self.bucket()
            .set_acl(&key, self.canonical_acl())
            .await
            .map_err(|err| StorageError::from_bucket(name, err))?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            name = name,
            key = key.as_str(),
            acl = self.canonical_acl().as_str(),
            "storage: synced metadata"
        );
        Ok(())
    }
}
