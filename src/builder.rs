use crate::{
    bucket::{Bucket, MemoryBucket},
    config::{AddressingStyle, Credentials, MetadataValue, StorageConfig, StorageRole},
    connection::Connection,
    error::ConfigError,
    storage::BucketStorage,
};

/// Builder for configuring a [`BucketStorage`] instance.
#[derive(Debug, Clone, Default)]
pub struct StorageBuilder {
    config: StorageConfig,
}

impl StorageBuilder {
    /// Creates a builder seeded with the media profile.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder seeded with the defaults for `role`.
    pub fn for_role(role: StorageRole) -> Self {
        Self {
            config: StorageConfig::for_role(role),
        }
    }

    /// Creates a builder seeded with the media profile.
    pub fn media() -> Self {
        Self::for_role(StorageRole::Media)
    }

    /// Creates a builder seeded with the static-files profile.
    pub fn static_files() -> Self {
        Self::for_role(StorageRole::Static)
    }

    /// Returns the current builder configuration snapshot.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Replaces the full builder configuration.
    pub fn with_config(mut self, config: StorageConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the storage region.
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = region.into();
        self
    }

    /// Sets the access key pair.
    pub fn credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.config.credentials = Some(Credentials::new(access_key_id, secret_access_key));
        self
    }

    /// Sets the bucket name.
    pub fn bucket_name(mut self, name: impl Into<String>) -> Self {
        self.config.bucket_name = name.into();
        self
    }

    /// Sets the bucket addressing style.
    pub fn addressing_style(mut self, style: AddressingStyle) -> Self {
        self.config.addressing_style = style;
        self
    }

    /// Overrides the storage endpoint host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = Some(host.into());
        self
    }

    /// Sets the key prefix.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    /// Enables or disables bucket auth.
    pub fn bucket_auth(mut self, enabled: bool) -> Self {
        self.config.bucket_auth = enabled;
        self
    }

    /// Sets the cache lifetime in seconds.
    pub fn max_age_seconds(mut self, seconds: u64) -> Self {
        self.config.max_age_seconds = seconds;
        self
    }

    /// Sets the public URL base.
    pub fn public_url(mut self, url: impl Into<String>) -> Self {
        self.config.public_url = Some(url.into());
        self
    }

    /// Enables or disables reduced-redundancy storage.
    pub fn reduced_redundancy(mut self, enabled: bool) -> Self {
        self.config.reduced_redundancy = enabled;
        self
    }

    /// Adds a metadata header written with every object.
    pub fn metadata(mut self, name: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.config.metadata.insert(name.into(), value.into());
        self
    }

    /// Adds a metadata header computed from each object's name.
    pub fn computed_metadata<F>(mut self, name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.config
            .metadata
            .insert(name.into(), MetadataValue::computed(compute));
        self
    }

    /// Enables or disables server-side encryption.
    pub fn encrypt(mut self, enabled: bool) -> Self {
        self.config.encrypt = enabled;
        self
    }

    /// Enables or disables gzip compression of compressible uploads.
    pub fn gzip(mut self, enabled: bool) -> Self {
        self.config.gzip = enabled;
        self
    }

    /// Validates builder configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.config.validate()
    }

    /// Finalizes and returns validated configuration.
    pub fn build_config(self) -> Result<StorageConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Builds a storage adapter over `bucket`.
    pub fn build<B: Bucket>(self, bucket: B) -> Result<BucketStorage<B>, ConfigError> {
        BucketStorage::new(self.config, bucket)
    }

    /// Builds a storage adapter over a fresh in-memory bucket named after the configuration.
    pub fn build_in_memory(self) -> Result<BucketStorage<MemoryBucket>, ConfigError> {
        let config = self.build_config()?;
        let connection = Connection::connect(&config);
        let bucket = connection.memory_bucket(&config.bucket_name);
        BucketStorage::new(config, bucket)
    }
}
