//! File-storage contract and the bucket-backed adapter implementing it.

use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::NaiveDateTime;

use crate::{error::StorageError, upload::Content};

/// Bucket-backed [`FileStorage`] adapter.
pub mod adapter;
/// Read handle returned by [`FileStorage::open`].
pub mod file;
/// Metadata resynchronization sweep.
pub mod sync;
pub use adapter::BucketStorage;
pub use file::BucketFile;

/// Access requested by an open mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// `r`
    Read,
    /// `w`
    Write,
    /// `a`
    Append,
    /// `x`
    Create,
}

impl Access {
    fn as_char(self) -> char {
        match self {
            Self::Read => 'r',
            Self::Write => 'w',
            Self::Append => 'a',
            Self::Create => 'x',
        }
    }
}

/// Mode a file is opened in, parsed from the usual mode strings (`r`, `rb`, `w+`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpenMode {
    access: Access,
    update: bool,
    binary: bool,
}

impl OpenMode {
    /// Read-only text mode, `r`.
    pub const READ: Self = Self::new(Access::Read, false, false);
    /// Read-only binary mode, `rb`.
    pub const READ_BINARY: Self = Self::new(Access::Read, false, true);
    /// Truncating write mode, `w`.
    pub const WRITE: Self = Self::new(Access::Write, false, false);
    /// Truncating binary write mode, `wb`.
    pub const WRITE_BINARY: Self = Self::new(Access::Write, false, true);

    /// Creates a mode from its parts.
    pub const fn new(access: Access, update: bool, binary: bool) -> Self {
        Self {
            access,
            update,
            binary,
        }
    }

    /// Returns the primary access.
    pub fn access(self) -> Access {
        self.access
    }

    /// Returns `true` when `+` was requested.
    pub fn is_update(self) -> bool {
        self.update
    }

    /// Returns `true` for binary modes.
    pub fn is_binary(self) -> bool {
        self.binary
    }

    /// Returns `true` when the mode only reads.
    pub fn is_read_only(self) -> bool {
        self.access == Access::Read && !self.update
    }
}

impl Default for OpenMode {
    fn default() -> Self {
        Self::READ_BINARY
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.access.as_char())?;
        if self.update {
            f.write_str("+")?;
        }
        if self.binary {
            f.write_str("b")?;
        }
        Ok(())
    }
}

impl FromStr for OpenMode {
    type Err = StorageError;

    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        let unsupported = || StorageError::UnsupportedMode {
            mode: mode.to_owned(),
        };

        let mut access = None;
        let mut update = false;
        let mut binary = None;

        for flag in mode.chars() {
            match flag {
                'r' | 'w' | 'a' | 'x' if access.is_none() => {
                    access = Some(match flag {
                        'r' => Access::Read,
                        'w' => Access::Write,
                        'a' => Access::Append,
                        _ => Access::Create,
                    });
                }
                '+' if !update => update = true,
                'b' | 't' if binary.is_none() => binary = Some(flag == 'b'),
                _ => return Err(unsupported()),
            }
        }

        let access = access.ok_or_else(unsupported)?;
        Ok(Self::new(access, update, binary.unwrap_or(false)))
    }
}

/// One level of a directory listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// Immediate subdirectory names.
    pub directories: BTreeSet<String>,
    /// Immediate file names.
    pub files: BTreeSet<String>,
}

impl Listing {
    /// Returns `true` when the level holds neither files nor directories.
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty() && self.files.is_empty()
    }
}

/// Async file-storage contract exposed to a hosting framework.
///
/// Names are logical, POSIX-style paths relative to the storage root.
#[async_trait::async_trait]
pub trait FileStorage: Send + Sync {
    /// Handle returned by [`FileStorage::open`].
    type File: Send;

    /// Opens a file for reading. Only read-only modes are supported.
    async fn open(&self, name: &str, mode: OpenMode) -> Result<Self::File, StorageError>;

    /// Saves `content` under `name`, returning the normalized name stored.
    async fn save(&self, name: &str, content: Content) -> Result<String, StorageError>;

    /// Deletes a file. Deleting a missing file succeeds.
    async fn delete(&self, name: &str) -> Result<(), StorageError>;

    /// Returns `true` when `name` is a file or a non-empty directory.
    async fn exists(&self, name: &str) -> Result<bool, StorageError>;

    /// Lists the immediate children of `path`.
    async fn listdir(&self, path: &str) -> Result<Listing, StorageError>;

    /// Returns the stored size of a file in bytes.
    async fn size(&self, name: &str) -> Result<u64, StorageError>;

    /// Returns a URL for a file.
    fn url(&self, name: &str) -> Result<String, StorageError>;

    /// Returns the last modification time in UTC.
    async fn modified_time(&self, name: &str) -> Result<NaiveDateTime, StorageError>;

    /// Returns the last access time. Defaults to [`FileStorage::modified_time`].
    async fn accessed_time(&self, name: &str) -> Result<NaiveDateTime, StorageError> {
        self.modified_time(name).await
    }

    /// Returns the creation time. Defaults to [`FileStorage::modified_time`].
    async fn created_time(&self, name: &str) -> Result<NaiveDateTime, StorageError> {
        self.modified_time(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_mode_strings() {
        assert_eq!("r".parse::<OpenMode>().unwrap(), OpenMode::READ);
        assert_eq!("rb".parse::<OpenMode>().unwrap(), OpenMode::READ_BINARY);
        assert_eq!("br".parse::<OpenMode>().unwrap(), OpenMode::READ_BINARY);
        assert_eq!("wb".parse::<OpenMode>().unwrap(), OpenMode::WRITE_BINARY);

        let update: OpenMode = "r+b".parse().unwrap();
        assert_eq!(update.access(), Access::Read);
        assert!(update.is_update());
        assert!(!update.is_read_only());
        assert_eq!(update.to_string(), "r+b");
    }

    #[test]
    fn rejects_malformed_mode_strings() {
        for mode in ["", "q", "rw", "r++", "rbt", "b"] {
            let err = mode.parse::<OpenMode>().unwrap_err();
            assert!(
                matches!(err, StorageError::UnsupportedMode { .. }),
                "{mode:?} should be rejected"
            );
        }
    }

    #[test]
    fn only_plain_read_modes_are_read_only() {
        assert!(OpenMode::READ.is_read_only());
        assert!(OpenMode::READ_BINARY.is_read_only());
        assert!(!OpenMode::WRITE.is_read_only());
        assert!(!"a".parse::<OpenMode>().unwrap().is_read_only());
    }
}
