#![allow(missing_docs)]

use std::{io::Read, time::Duration};

use bucket_storage::{
    bucket::BoxStream, Bucket, BucketError, BucketStorage, CannedAcl, Connection, Content,
    DiskBucket, FileStorage, GetObject, ListEntry, ObjectHead, OpenMode, PutOptions,
    StorageConfig, StorageError,
};
use bytes::Bytes;
use http::{HeaderMap, Method};
use uuid::Uuid;

/// Bucket whose every remote call fails, as an unreachable endpoint would.
#[derive(Debug, Clone)]
struct UnreachableBucket;

fn unreachable() -> BucketError {
    BucketError::new("connection refused")
}

#[async_trait::async_trait]
impl Bucket for UnreachableBucket {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn list(&self, _: &str, _: Option<&str>) -> Result<Vec<ListEntry>, BucketError> {
        Err(unreachable())
    }

    async fn head(&self, _: &str) -> Result<Option<ObjectHead>, BucketError> {
        Err(unreachable())
    }

    async fn get(&self, _: &str) -> Result<Option<GetObject>, BucketError> {
        Err(unreachable())
    }

    async fn put(
        &self,
        _: &str,
        _: BoxStream<'_, Result<Bytes, BucketError>>,
        _: PutOptions,
    ) -> Result<ObjectHead, BucketError> {
        Err(unreachable())
    }

    async fn copy_in_place(
        &self,
        _: &str,
        _: HeaderMap,
        _: bool,
    ) -> Result<ObjectHead, BucketError> {
        Err(unreachable())
    }

    async fn set_acl(&self, _: &str, _: CannedAcl) -> Result<(), BucketError> {
        Err(unreachable())
    }

    async fn delete(&self, _: &str) -> Result<(), BucketError> {
        Err(unreachable())
    }

    fn signed_url(&self, _: &Method, _: &str, _: Duration, _: bool) -> Result<String, BucketError> {
        Err(unreachable())
    }
}

fn config() -> StorageConfig {
    StorageConfig {
        bucket_name: "files".to_owned(),
        key_prefix: "p".to_owned(),
        ..StorageConfig::media()
    }
}

async fn exercise_contract<S: FileStorage<File = bucket_storage::BucketFile>>(storage: &S) {
    let payload = "conformance ".repeat(64);
    let name = storage
        .save("x/y/z.txt", Content::text(payload.clone()))
        .await
        .expect("save should succeed");
    assert_eq!(name, "x/y/z.txt");

    assert!(storage.exists("x").await.unwrap());
    assert!(storage.exists("x/y/z.txt").await.unwrap());
    assert!(!storage.exists("x/y/z").await.unwrap());

    let listing = storage.listdir("x").await.unwrap();
    assert!(listing.files.is_empty());
    assert!(listing.directories.contains("y"));

    let mut file = storage.open("x/y/z.txt", OpenMode::READ).await.unwrap();
    let mut out = String::new();
    file.read_to_string(&mut out).unwrap();
    assert_eq!(out, payload);

    assert!(storage.size("x/y/z.txt").await.unwrap() < payload.len() as u64);
    storage.modified_time("x/y/z.txt").await.unwrap();

    storage.delete("x/y/z.txt").await.unwrap();
    assert!(!storage.exists("x").await.unwrap());
    assert!(storage.size("x/y/z.txt").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn memory_bucket_satisfies_contract() {
    let storage = BucketStorage::in_memory(config()).unwrap();
    exercise_contract(&storage).await;
    assert!(storage.bucket().is_empty().await);
}

#[tokio::test]
async fn disk_bucket_satisfies_contract() {
    let root = std::env::temp_dir().join(format!("bucket-storage-test-{}", Uuid::new_v4()));
    let config = config();
    let bucket = DiskBucket::builder()
        .destination(&root)
        .name("files")
        .connection(Connection::connect(&config))
        .build()
        .unwrap();
    let storage = BucketStorage::new(config, bucket).unwrap();

    exercise_contract(&storage).await;

    let _ = tokio::fs::remove_dir_all(root).await;
}

#[tokio::test]
async fn remote_failures_pass_through_unchanged() {
    let storage = BucketStorage::new(config(), UnreachableBucket).unwrap();

    let errors = [
        storage.save("a.txt", Content::text("x")).await.unwrap_err(),
        storage.delete("a.txt").await.unwrap_err(),
        storage.exists("a.txt").await.unwrap_err(),
        storage.listdir("").await.unwrap_err(),
        storage.size("a.txt").await.unwrap_err(),
        storage.open("a.txt", OpenMode::READ).await.unwrap_err(),
        storage.url("a.txt").unwrap_err(),
        storage.sync_metadata().await.unwrap_err(),
    ];

    for err in errors {
        assert!(
            matches!(&err, StorageError::Bucket(BucketError::Message { message }) if message == "connection refused"),
            "unexpected error: {err:?}"
        );
    }
}
