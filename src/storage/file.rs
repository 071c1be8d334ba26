use std::{
    fmt,
    io::{self, Read, Seek, SeekFrom},
};

use flate2::read::GzDecoder;
use tempfile::SpooledTempFile;

use super::BucketStorage;
use crate::{bucket::Bucket, error::StorageError, upload::temporary_buffer};

/// Read handle over a downloaded object.
///
/// The object is fetched in full when opened. Gzip-encoded objects are
/// decompressed into a second temporary buffer up front, so every handle
/// supports seeking.
pub struct BucketFile {
    name: String,
    gzip: bool,
    contents: Option<SpooledTempFile>,
}

impl BucketFile {
    pub(crate) fn new(name: &str, buffer: SpooledTempFile, gzip: bool) -> io::Result<Self> {
        let contents = if gzip {
            let mut decoded = temporary_buffer();
            io::copy(&mut GzDecoder::new(buffer), &mut decoded)?;
            decoded.rewind()?;
            decoded
        } else {
            buffer
        };

        Ok(Self {
            name: name.to_owned(),
            gzip,
            contents: Some(contents),
        })
    }

    /// Returns the logical name the file was opened with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` when the stored object is gzip-encoded.
    pub fn is_gzipped(&self) -> bool {
        self.gzip
    }

    /// Releases the downloaded buffer.
    pub fn close(&mut self) {
        self.contents = None;
    }

    /// Returns `true` once [`BucketFile::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.contents.is_none()
    }

    /// Re-fetches a closed file from `storage`. Open files are left untouched.
    pub async fn reopen<B: Bucket>(&mut self, storage: &BucketStorage<B>) -> Result<(), StorageError> {
        if self.is_closed() {
            *self = storage.fetch(&self.name).await?;
        }
        Ok(())
    }

    fn contents(&mut self) -> io::Result<&mut SpooledTempFile> {
        match &mut self.contents {
            Some(contents) => Ok(contents),
            None => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("file `{}` is closed", self.name),
            )),
        }
    }
}

impl Read for BucketFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.contents()?.read(buf)
    }
}

impl Seek for BucketFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.contents()?.seek(pos)
    }
}

impl fmt::Debug for BucketFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketFile")
            .field("name", &self.name)
            .field("gzip", &self.gzip)
            .field("closed", &self.is_closed())
            .finish()
    }
}
