//! # In-Memory Cache
//!
//! In-memory implementation of [`CacheRepository`] for testing.
//!
//! Expiry is tracked with `tokio::time::Instant`, so tests can drive TTLs
//! with `tokio::time::pause` and `advance`. Expired entries are dropped
//! lazily when touched or listed.
//!
//! Several caches can share one keyspace through
//! [`InMemoryCache::with_namespace`], the way tenants share one Redis.

use crate::infrastructure::cache::traits::{CacheRepository, CacheValue, CachedPayload};
use crate::infrastructure::namespace::TenantNamespace;
use crate::infrastructure::persistence::traits::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

const ENTITY: &str = "CacheKey";

#[derive(Debug, Clone)]
struct Entry {
    payload: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-memory implementation of [`CacheRepository`].
#[derive(Debug, Clone)]
pub struct InMemoryCache {
    storage: Arc<RwLock<HashMap<String, Entry>>>,
    namespace: TenantNamespace,
    default_ttl: Duration,
}

impl InMemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(namespace: TenantNamespace, default_ttl: Duration) -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
            namespace,
            default_ttl,
        }
    }

    /// A view of the same keyspace under another namespace.
    #[must_use]
    pub fn with_namespace(&self, namespace: TenantNamespace) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            namespace,
            default_ttl: self.default_ttl,
        }
    }

    /// Number of stored entries across all namespaces, expired ones
    /// included until they are touched.
    #[must_use]
    pub fn len(&self) -> usize {
        self.storage
            .try_read()
            .map(|guard| guard.len())
            .unwrap_or(0)
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry in every namespace.
    pub async fn clear(&self) {
        let mut storage = self.storage.write().await;
        storage.clear();
    }

    async fn live_keys(&self, pattern: &str) -> Vec<String> {
        let full_pattern = self.namespace.cache_key(pattern);
        let now = Instant::now();
        let mut storage = self.storage.write().await;
        storage.retain(|_, entry| entry.is_live(now));
        let mut keys: Vec<String> = storage
            .keys()
            .filter(|key| glob_match(&full_pattern, key))
            .cloned()
            .collect();
        keys.sort_unstable();
        keys
    }
}

#[async_trait]
impl CacheRepository for InMemoryCache {
    fn namespace(&self) -> &TenantNamespace {
        &self.namespace
    }

    fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    async fn set(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Option<Duration>,
    ) -> RepositoryResult<()> {
        let payload = value.to_bytes()?;
        let ttl = ttl.unwrap_or(self.default_ttl);
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        let mut storage = self.storage.write().await;
        storage.insert(self.namespace.cache_key(key), Entry { payload, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> RepositoryResult<CachedPayload> {
        let storage = self.storage.read().await;
        storage
            .get(&self.namespace.cache_key(key))
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| CachedPayload::new(entry.payload.clone()))
            .ok_or_else(|| RepositoryError::not_found(ENTITY, key))
    }

    async fn delete(&self, key: &str) -> RepositoryResult<()> {
        let mut storage = self.storage.write().await;
        storage.remove(&self.namespace.cache_key(key));
        Ok(())
    }

    async fn exists(&self, key: &str) -> RepositoryResult<bool> {
        let storage = self.storage.read().await;
        Ok(storage
            .get(&self.namespace.cache_key(key))
            .is_some_and(|entry| entry.is_live(Instant::now())))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> RepositoryResult<bool> {
        let full_key = self.namespace.cache_key(key);
        let now = Instant::now();
        let mut storage = self.storage.write().await;
        let live = storage.get(&full_key).is_some_and(|entry| entry.is_live(now));
        if !live {
            storage.remove(&full_key);
            return Ok(false);
        }
        if ttl.is_zero() {
            storage.remove(&full_key);
        } else if let Some(entry) = storage.get_mut(&full_key) {
            entry.expires_at = Some(now + ttl);
        }
        Ok(true)
    }

    async fn ttl(&self, key: &str) -> RepositoryResult<Option<Duration>> {
        let now = Instant::now();
        let storage = self.storage.read().await;
        let entry = storage
            .get(&self.namespace.cache_key(key))
            .filter(|entry| entry.is_live(now))
            .ok_or_else(|| RepositoryError::not_found(ENTITY, key))?;
        Ok(entry.expires_at.map(|at| at.saturating_duration_since(now)))
    }

    async fn keys(&self, pattern: &str) -> RepositoryResult<Vec<String>> {
        Ok(self
            .live_keys(pattern)
            .await
            .iter()
            .filter_map(|full| self.namespace.strip_cache_key(full))
            .map(str::to_string)
            .collect())
    }

    async fn delete_pattern(&self, pattern: &str) -> RepositoryResult<u64> {
        let keys = self.live_keys(pattern).await;
        let mut storage = self.storage.write().await;
        let removed = keys
            .iter()
            .filter(|key| storage.remove(key.as_str()).is_some())
            .count();
        Ok(removed as u64)
    }
}

/// Glob matching with Redis `MATCH` semantics for `*`, `?` and `\` escapes.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match (pattern.get(p), text.get(t)) {
            (Some('*'), _) => {
                backtrack = Some((p, t));
                p += 1;
                continue;
            }
            (Some('?'), Some(_)) => {
                p += 1;
                t += 1;
                continue;
            }
            (Some('\\'), Some(c)) if pattern.get(p + 1) == Some(c) => {
                p += 2;
                t += 1;
                continue;
            }
            (Some(expected), Some(c)) if expected == c && *expected != '\\' => {
                p += 1;
                t += 1;
                continue;
            }
            _ => {}
        }
        match backtrack {
            Some((star, matched)) => {
                p = star + 1;
                t = matched + 1;
                backtrack = Some((star, matched + 1));
            }
            None => return false,
        }
    }
    pattern.get(p..).is_some_and(|rest| rest.iter().all(|c| *c == '*'))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cache() -> InMemoryCache {
        InMemoryCache::new(
            TenantNamespace::derive("exchange-simulator", "exchange-OKX"),
            Duration::from_secs(300),
        )
    }

    #[test]
    fn glob_patterns() {
        assert!(glob_match("ns:*", "ns:a:b"));
        assert!(glob_match("ns:order:?", "ns:order:1"));
        assert!(!glob_match("ns:order:?", "ns:order:12"));
        assert!(glob_match("*:quote:*", "ns:quote:BTC"));
        assert!(!glob_match("ns:*", "other:a"));
        assert!(glob_match(r"ns:\*", "ns:*"));
        assert!(!glob_match(r"ns:\*", "ns:x"));
        assert!(glob_match("*", ""));
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let err = cache().get("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = cache();
        cache
            .set("quote", "42".into(), Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert!(cache.exists("quote").await.unwrap());
        let remaining = cache.ttl("quote").await.unwrap().unwrap();
        assert!(remaining <= Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!cache.exists("quote").await.unwrap());
        assert!(cache.get("quote").await.unwrap_err().is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn default_and_persistent_ttl() {
        let cache = cache();
        cache.set("defaulted", "v".into(), None).await.unwrap();
        cache
            .set("pinned", "v".into(), Some(Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(
            cache.ttl("defaulted").await.unwrap(),
            Some(Duration::from_secs(300))
        );
        assert_eq!(cache.ttl("pinned").await.unwrap(), None);

        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(!cache.exists("defaulted").await.unwrap());
        assert!(cache.exists("pinned").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn expire_extends_existing_keys_only() {
        let cache = cache();
        cache
            .set("k", "v".into(), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(cache.expire("k", Duration::from_secs(60)).await.unwrap());
        assert!(!cache.expire("absent", Duration::from_secs(60)).await.unwrap());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.exists("k").await.unwrap());
        assert!(cache.expire("k", Duration::ZERO).await.unwrap());
        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn keys_are_namespace_stripped_and_isolated() {
        let okx = cache();
        let binance =
            okx.with_namespace(TenantNamespace::derive("exchange-simulator", "exchange-Binance"));
        okx.set("quote:BTC", "1".into(), None).await.unwrap();
        okx.set("quote:ETH", "2".into(), None).await.unwrap();
        okx.set("depth:BTC", "3".into(), None).await.unwrap();
        binance.set("quote:BTC", "9".into(), None).await.unwrap();

        assert_eq!(
            okx.keys("quote:*").await.unwrap(),
            vec!["quote:BTC".to_string(), "quote:ETH".to_string()]
        );
        assert_eq!(binance.keys("*").await.unwrap(), vec!["quote:BTC".to_string()]);
        assert_eq!(
            binance.get("quote:BTC").await.unwrap().into_string().unwrap(),
            "9"
        );
    }

    #[tokio::test]
    async fn delete_pattern_removes_matches_only() {
        let cache = cache();
        for key in ["quote:BTC", "quote:ETH", "depth:BTC"] {
            cache.set(key, key.into(), None).await.unwrap();
        }
        assert_eq!(cache.delete_pattern("quote:*").await.unwrap(), 2);
        assert_eq!(cache.keys("*").await.unwrap(), vec!["depth:BTC".to_string()]);
        cache.delete("depth:BTC").await.unwrap();
        cache.delete("depth:BTC").await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn round_trips_bytes_and_documents() {
        let cache = cache();
        let raw = Bytes::from_static(&[0, 1, 254, 255]);
        cache.set("raw", raw.clone().into(), None).await.unwrap();
        assert_eq!(cache.get("raw").await.unwrap().into_bytes(), raw);

        let doc = serde_json::json!({"bids": [[50000.5, 1.2]], "venue": "OKX"});
        cache
            .set("doc", CacheValue::json(&doc).unwrap(), None)
            .await
            .unwrap();
        let back: serde_json::Value = cache.get("doc").await.unwrap().decode().unwrap();
        assert_eq!(back, doc);
    }
}
