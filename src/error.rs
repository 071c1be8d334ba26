use thiserror::Error;

/// Configuration-time validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A public URL and bucket auth were configured together.
    #[error("cannot use bucket auth together with a public URL")]
    PublicUrlWithBucketAuth,
    /// No bucket name was configured.
    #[error("bucket name cannot be empty")]
    MissingBucketName,
    /// A configured metadata key is not a valid header name.
    #[error("metadata key `{name}` is not a valid header name")]
    InvalidMetadataHeader {
        /// The rejected metadata key.
        name: String,
    },
    /// The configured key prefix escapes the bucket root.
    #[error("key prefix `{prefix}` escapes the bucket root")]
    InvalidKeyPrefix {
        /// The rejected key prefix.
        prefix: String,
    },
}

/// Failures reported by a remote bucket.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BucketError {
    /// The requested key does not exist in the bucket.
    #[error("key `{key}` does not exist")]
    NotFound {
        /// Missing object key.
        key: String,
    },
    /// The key cannot be stored by this bucket.
    #[error("invalid object key `{key}`")]
    InvalidKey {
        /// Rejected object key.
        key: String,
    },
    /// A signed URL was requested without credentials.
    #[error("signed URLs require access credentials")]
    MissingCredentials,
    /// Transport or filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Generic remote failure with message context.
    #[error("{message}")]
    Message {
        /// Remote failure message.
        message: String,
    },
}

impl BucketError {
    /// Creates a bucket error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    /// Creates a not-found error for `key`.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }
}

/// Runtime error type used by `bucket-storage`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Invalid storage configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A file was opened in a mode other than read.
    #[error("bucket files can only be opened in read-only mode, got `{mode}`")]
    UnsupportedMode {
        /// The requested open mode.
        mode: String,
    },
    /// The named file does not exist.
    #[error("file `{name}` does not exist")]
    NotFound {
        /// Logical file name.
        name: String,
    },
    /// The name normalizes to a path above the storage root.
    #[error("path `{name}` escapes the storage root")]
    InvalidPath {
        /// Rejected logical name.
        name: String,
    },
    /// A header name or value could not be encoded.
    #[error("invalid header `{header}`")]
    InvalidHeader {
        /// Offending header name.
        header: String,
    },
    /// The stored last-modified value could not be parsed.
    #[error("file `{name}` has unparseable last-modified value `{value}`")]
    InvalidTimestamp {
        /// Logical file name.
        name: String,
        /// Raw last-modified value.
        value: String,
    },
    /// Remote bucket failure.
    #[error(transparent)]
    Bucket(#[from] BucketError),
    /// Temporary buffer failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Translates a bucket error for the logical `name`, mapping a missing key to
    /// [`StorageError::NotFound`].
    pub(crate) fn from_bucket(name: &str, err: BucketError) -> Self {
        match err {
            BucketError::NotFound { .. } => Self::NotFound {
                name: name.to_owned(),
            },
            other => Self::Bucket(other),
        }
    }

    /// Returns `true` for a missing-file error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
