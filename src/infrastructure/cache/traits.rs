//! # Cache Traits
//!
//! The namespaced key/value port and its value encoding.
//!
//! Keys passed to a [`CacheRepository`] are relative: the implementation
//! prefixes them with the tenant cache namespace on the way in and strips
//! it from listed keys on the way out.

use crate::infrastructure::namespace::TenantNamespace;
use crate::infrastructure::persistence::traits::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;

/// A value to store.
///
/// Text and raw bytes are stored verbatim; structured values are stored as
/// JSON documents.
///
/// # Examples
///
/// ```
/// use exchange_data_adapter::infrastructure::cache::CacheValue;
///
/// let text = CacheValue::from("hello");
/// assert_eq!(text.to_bytes().unwrap().as_ref(), b"hello");
///
/// let doc = CacheValue::json(&serde_json::json!({"bid": 1})).unwrap();
/// assert_eq!(doc.to_bytes().unwrap().as_ref(), br#"{"bid":1}"#);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    /// UTF-8 text.
    Text(String),
    /// Opaque bytes.
    Bytes(Bytes),
    /// JSON document.
    Structured(serde_json::Value),
}

impl CacheValue {
    /// Encodes any serializable value as a structured document.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Serialization` if the value cannot be
    /// represented as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> RepositoryResult<Self> {
        Ok(Self::Structured(serde_json::to_value(value)?))
    }

    /// Wire representation.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Serialization` if a structured value fails
    /// to encode.
    pub fn to_bytes(&self) -> RepositoryResult<Bytes> {
        match self {
            Self::Text(text) => Ok(Bytes::copy_from_slice(text.as_bytes())),
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::Structured(value) => Ok(Bytes::from(serde_json::to_vec(value)?)),
        }
    }
}

impl From<String> for CacheValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for CacheValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Bytes> for CacheValue {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<serde_json::Value> for CacheValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Structured(value)
    }
}

/// Raw bytes read back from the cache.
///
/// The caller decides how to interpret them, mirroring the [`CacheValue`]
/// variant used when writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPayload(Bytes);

impl CachedPayload {
    /// Wraps raw bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Borrowed bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Owned bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// Payload as text.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Serialization` if the payload is not UTF-8.
    pub fn as_str(&self) -> RepositoryResult<&str> {
        std::str::from_utf8(&self.0)
            .map_err(|e| RepositoryError::serialization(format!("cached value is not UTF-8: {e}")))
    }

    /// Payload as owned text.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Serialization` if the payload is not UTF-8.
    pub fn into_string(self) -> RepositoryResult<String> {
        self.as_str().map(str::to_string)
    }

    /// Decodes a structured payload.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Serialization` if the payload is not a JSON
    /// document of the requested shape.
    pub fn decode<T: DeserializeOwned>(&self) -> RepositoryResult<T> {
        Ok(serde_json::from_slice(&self.0)?)
    }
}

/// Namespaced key/value store with per-key TTL.
///
/// A `ttl` of `None` on [`CacheRepository::set`] applies the store's default
/// TTL; `Some(Duration::ZERO)` stores the key without expiry.
///
/// Patterns use glob syntax: `*` matches any run of characters and `?`
/// matches exactly one.
#[async_trait]
pub trait CacheRepository: Send + Sync + fmt::Debug {
    /// Namespace every key is stored under.
    fn namespace(&self) -> &TenantNamespace;

    /// TTL applied when a caller passes none.
    fn default_ttl(&self) -> Duration;

    /// Stores a value, replacing any previous one and its TTL.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Serialization` if the value cannot be
    /// encoded, or a connection error.
    async fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>)
    -> RepositoryResult<()>;

    /// Reads a value.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the key is absent or expired.
    async fn get(&self, key: &str) -> RepositoryResult<CachedPayload>;

    /// Removes a key. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> RepositoryResult<()>;

    /// Returns true if the key is present and unexpired.
    async fn exists(&self, key: &str) -> RepositoryResult<bool>;

    /// Resets the TTL of an existing key.
    ///
    /// Returns false if the key does not exist. A zero TTL removes the key.
    async fn expire(&self, key: &str, ttl: Duration) -> RepositoryResult<bool>;

    /// Remaining TTL; `None` for a key without expiry.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the key is absent.
    async fn ttl(&self, key: &str) -> RepositoryResult<Option<Duration>>;

    /// Keys matching `pattern`, with the namespace stripped.
    async fn keys(&self, pattern: &str) -> RepositoryResult<Vec<String>>;

    /// Deletes every key matching `pattern` and returns how many were
    /// removed.
    ///
    /// Keys are listed first and deleted afterwards; a key created in
    /// between may survive.
    async fn delete_pattern(&self, pattern: &str) -> RepositoryResult<u64>;
}
