use std::{collections::BTreeMap, fmt, sync::Arc};

use http::HeaderName;

use crate::{error::ConfigError, key::normalize_name};

/// Default storage region.
pub const DEFAULT_REGION: &str = "us-east-1";
/// Cache lifetime for media files: one hour.
pub const MEDIA_MAX_AGE_SECONDS: u64 = 60 * 60;
/// Cache lifetime for static files: one year.
pub const STATIC_MAX_AGE_SECONDS: u64 = 60 * 60 * 24 * 365;

type MetadataFn = dyn Fn(&str) -> String + Send + Sync;

/// File role a configuration profile is tuned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageRole {
    /// User-uploaded media: private objects, short cache lifetime.
    Media,
    /// Framework static assets: public objects, long cache lifetime.
    Static,
}

/// URL convention used to address a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressingStyle {
    /// `https://host/bucket/key`.
    #[default]
    Path,
    /// `https://bucket.host/key`.
    VirtualHost,
}

/// Access key pair used to sign requests.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Public access key identifier.
    pub access_key_id: String,
    /// Secret signing key.
    pub secret_access_key: String,
}

impl Credentials {
    /// Creates a credential pair.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Metadata header value attached to every written object.
#[derive(Clone)]
pub enum MetadataValue {
    /// The same value for every object.
    Constant(String),
    /// A value computed from the object's logical name at write time.
    Computed(Arc<MetadataFn>),
}

impl MetadataValue {
    /// Creates a value computed from the object name.
    pub fn computed<F>(compute: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(compute))
    }

    /// Evaluates the value for the object `name`.
    pub fn resolve(&self, name: &str) -> String {
        match self {
            Self::Constant(value) => value.clone(),
            Self::Computed(compute) => compute(name),
        }
    }
}

impl fmt::Debug for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed(<fn>)"),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Constant(value.to_owned())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Constant(value)
    }
}

/// Immutable settings for one storage adapter instance.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Storage region passed to the connection.
    pub region: String,
    /// Access credentials; anonymous when `None`.
    pub credentials: Option<Credentials>,
    /// Name of the bucket holding the files.
    pub bucket_name: String,
    /// Bucket addressing convention.
    pub addressing_style: AddressingStyle,
    /// Host override for the storage endpoint.
    pub host: Option<String>,
    /// Prefix prepended to every object key.
    pub key_prefix: String,
    /// Private objects served through signed URLs when `true`, public objects otherwise.
    pub bucket_auth: bool,
    /// Cache lifetime in seconds, also used as the signed URL expiry.
    pub max_age_seconds: u64,
    /// Base URL for unsigned public links. Incompatible with `bucket_auth`.
    pub public_url: Option<String>,
    /// Store objects in the reduced-redundancy class.
    pub reduced_redundancy: bool,
    /// Extra headers written with every object.
    pub metadata: BTreeMap<String, MetadataValue>,
    /// Request server-side encryption on writes.
    pub encrypt: bool,
    /// Gzip compressible content types when it saves space.
    pub gzip: bool,
}

impl StorageConfig {
    /// Returns the default profile for `role`.
    pub fn for_role(role: StorageRole) -> Self {
        let (bucket_auth, max_age_seconds) = match role {
            StorageRole::Media => (true, MEDIA_MAX_AGE_SECONDS),
            StorageRole::Static => (false, STATIC_MAX_AGE_SECONDS),
        };

        Self {
            region: DEFAULT_REGION.to_owned(),
            credentials: None,
            bucket_name: String::new(),
            addressing_style: AddressingStyle::Path,
            host: None,
            key_prefix: String::new(),
            bucket_auth,
            max_age_seconds,
            public_url: None,
            reduced_redundancy: false,
            metadata: BTreeMap::new(),
            encrypt: false,
            gzip: true,
        }
    }

    /// Default profile for user-uploaded media.
    pub fn media() -> Self {
        Self::for_role(StorageRole::Media)
    }

    /// Default profile for static assets.
    pub fn static_files() -> Self {
        Self::for_role(StorageRole::Static)
    }

    /// Returns the public base URL, treating an empty string as unset.
    pub fn public_base_url(&self) -> Option<&str> {
        self.public_url.as_deref().filter(|url| !url.is_empty())
    }

    /// Validates option combinations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.public_base_url().is_some() && self.bucket_auth {
            return Err(ConfigError::PublicUrlWithBucketAuth);
        }

        if self.bucket_name.trim().is_empty() {
            return Err(ConfigError::MissingBucketName);
        }

        if let Some(name) = self
            .metadata
            .keys()
            .find(|name| HeaderName::from_bytes(name.as_bytes()).is_err())
        {
            return Err(ConfigError::InvalidMetadataHeader { name: name.clone() });
        }

        if normalize_name(&self.key_prefix).is_err() {
            return Err(ConfigError::InvalidKeyPrefix {
                prefix: self.key_prefix.clone(),
            });
        }

        Ok(())
    }

    /// Computes the `Cache-Control` header for written objects.
    pub fn cache_control(&self) -> String {
        let privacy = if self.bucket_auth { "private" } else { "public" };
        format!("{privacy},max-age={}", self.max_age_seconds)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::media()
    }
}
