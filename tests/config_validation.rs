#![allow(missing_docs)]

use bucket_storage::{
    BucketStorage, ConfigError, MemoryBucket, MetadataValue, StorageConfig, StorageRole,
};

fn named(config: StorageConfig) -> StorageConfig {
    StorageConfig {
        bucket_name: "files".to_owned(),
        ..config
    }
}

#[test]
fn role_defaults_are_valid_once_named() {
    assert!(named(StorageConfig::media()).validate().is_ok());
    assert!(named(StorageConfig::static_files()).validate().is_ok());
    assert!(named(StorageConfig::default()).validate().is_ok());
}

#[test]
fn cache_control_follows_role_defaults() {
    assert_eq!(StorageConfig::media().cache_control(), "private,max-age=3600");
    assert_eq!(
        StorageConfig::for_role(StorageRole::Static).cache_control(),
        "public,max-age=31536000"
    );
}

#[test]
fn rejects_public_url_with_bucket_auth() {
    let config = named(StorageConfig {
        public_url: Some("https://cdn.example.com/media".to_owned()),
        ..StorageConfig::media()
    });

    assert_eq!(config.validate(), Err(ConfigError::PublicUrlWithBucketAuth));
}

#[test]
fn accepts_public_url_without_bucket_auth() {
    let config = named(StorageConfig {
        public_url: Some("https://cdn.example.com/static".to_owned()),
        ..StorageConfig::static_files()
    });

    assert!(config.validate().is_ok());
}

#[test]
fn empty_public_url_counts_as_unset() {
    let config = named(StorageConfig {
        public_url: Some(String::new()),
        ..StorageConfig::media()
    });

    assert!(config.validate().is_ok());
    assert_eq!(config.public_base_url(), None);
}

#[test]
fn rejects_missing_bucket_name() {
    let config = StorageConfig {
        bucket_name: "  ".to_owned(),
        ..StorageConfig::media()
    };

    assert_eq!(config.validate(), Err(ConfigError::MissingBucketName));
}

#[test]
fn rejects_metadata_keys_that_are_not_header_names() {
    let mut config = named(StorageConfig::media());
    config
        .metadata
        .insert("bad header".to_owned(), MetadataValue::from("x"));

    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidMetadataHeader { name }) if name == "bad header"
    ));
}

#[test]
fn rejects_key_prefix_escaping_the_root() {
    let config = named(StorageConfig {
        key_prefix: "media/../..".to_owned(),
        ..StorageConfig::media()
    });

    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidKeyPrefix { .. })
    ));
}

#[test]
fn adapter_construction_validates_config() {
    let config = StorageConfig::media();
    let bucket = MemoryBucket::new("files", bucket_storage::Connection::connect(&config));

    let result = BucketStorage::new(config, bucket);
    assert!(matches!(result, Err(ConfigError::MissingBucketName)));
}
