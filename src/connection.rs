use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use http::Method;
use sha2::Sha256;

use crate::{
    bucket::MemoryBucket,
    config::{AddressingStyle, Credentials, StorageConfig},
    error::BucketError,
    key::{escape_query_value, escape_uri_path},
};

/// Endpoint host used when no override is configured.
pub const DEFAULT_HOST: &str = "storage.googleapis.com";

type HmacSha256 = Hmac<Sha256>;

/// Connection parameters for an object-storage endpoint.
///
/// Owns everything needed to address objects and sign URLs for them; buckets
/// obtained from a connection share it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    region: String,
    credentials: Option<Credentials>,
    addressing_style: AddressingStyle,
    host: String,
}

impl Connection {
    /// Connects using the endpoint settings of `config`.
    pub fn connect(config: &StorageConfig) -> Self {
        Self {
            region: config.region.clone(),
            credentials: config.credentials.clone(),
            addressing_style: config.addressing_style,
            host: config
                .host
                .clone()
                .unwrap_or_else(|| DEFAULT_HOST.to_owned()),
        }
    }

    /// Returns the configured region.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Returns the endpoint host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns a fresh in-memory bucket bound to this connection.
    pub fn memory_bucket(&self, name: impl Into<String>) -> MemoryBucket {
        MemoryBucket::new(name, self.clone())
    }

    /// Returns the unsigned URL of `key` in `bucket`.
    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        let key = escape_uri_path(key);
        match self.addressing_style {
            AddressingStyle::Path => format!("https://{}/{bucket}/{key}", self.host),
            AddressingStyle::VirtualHost => format!("https://{bucket}.{}/{key}", self.host),
        }
    }

    /// Generates a URL for `method` on `key`, query-signed when `query_auth` is set.
    ///
    /// Signed URLs expire `expires_in` from now.
    pub fn generate_url(
        &self,
        method: &Method,
        bucket: &str,
        key: &str,
        expires_in: Duration,
        query_auth: bool,
    ) -> Result<String, BucketError> {
        self.generate_url_at(method, bucket, key, expires_in, query_auth, Utc::now().timestamp())
    }

    pub(crate) fn generate_url_at(
        &self,
        method: &Method,
        bucket: &str,
        key: &str,
        expires_in: Duration,
        query_auth: bool,
        now: i64,
    ) -> Result<String, BucketError> {
        let url = self.object_url(bucket, key);
        if !query_auth {
            return Ok(url);
        }

        let credentials = self
            .credentials
            .as_ref()
            .ok_or(BucketError::MissingCredentials)?;
        let expires = now.saturating_add(i64::try_from(expires_in.as_secs()).unwrap_or(i64::MAX));
        let signature = sign(
            &credentials.secret_access_key,
            &string_to_sign(method, bucket, key, expires),
        )?;

        Ok(format!(
            "{url}?GoogleAccessId={}&Expires={expires}&Signature={}",
            escape_query_value(&credentials.access_key_id),
            escape_query_value(&signature),
        ))
    }
}

fn string_to_sign(method: &Method, bucket: &str, key: &str, expires: i64) -> String {
    format!("{method}\n\n\n{expires}\n/{bucket}/{key}")
}

fn sign(secret: &str, payload: &str) -> Result<String, BucketError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| BucketError::new(format!("invalid signing key: {err}")))?;
    mac.update(payload.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
