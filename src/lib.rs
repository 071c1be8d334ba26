#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! File storage over an object-storage bucket.
//!
//! [`BucketStorage`] implements the [`FileStorage`] contract (open, save,
//! delete, exists, listdir, size, url, timestamps) on top of any [`Bucket`].
//! Uploads get a content type from their name, optional gzip compression
//! and a `Cache-Control` header derived from the [`StorageConfig`].

/// Remote bucket abstraction and implementations.
pub mod bucket;
/// Fluent configuration builder.
pub mod builder;
/// Storage configuration and role defaults.
pub mod config;
/// Endpoint connection and URL signing.
pub mod connection;
/// Error types exposed by this crate.
pub mod error;
/// Logical name to object key mapping.
pub mod key;
/// File-storage contract and adapter.
pub mod storage;
/// Upload preparation pipeline.
pub mod upload;

pub use bucket::{
    Bucket, CannedAcl, DiskBucket, DiskBucketBuilder, GetObject, ListEntry, MemoryBucket,
    ObjectHead, PutOptions,
};
pub use builder::StorageBuilder;
pub use config::{AddressingStyle, Credentials, MetadataValue, StorageConfig, StorageRole};
pub use connection::Connection;
pub use error::{BucketError, ConfigError, StorageError};
pub use key::KeyMapper;
pub use storage::{Access, BucketFile, BucketStorage, FileStorage, Listing, OpenMode};
pub use upload::{prepare_upload, Content, UploadBody, UploadEnvelope};
