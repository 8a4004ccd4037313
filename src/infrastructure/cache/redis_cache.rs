//! # Redis Cache
//!
//! [`CacheRepository`] over a shared [`RedisConnection`].
//!
//! Keys are listed with a `SCAN` cursor loop rather than `KEYS`, so pattern
//! listing never blocks the server on a large keyspace. TTLs are set and
//! read with millisecond precision (`PX`, `PEXPIRE`, `PTTL`).

use crate::infrastructure::cache::redis_client::RedisConnection;
use crate::infrastructure::cache::traits::{CacheRepository, CacheValue, CachedPayload};
use crate::infrastructure::namespace::TenantNamespace;
use crate::infrastructure::persistence::traits::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::Span;

const SCAN_COUNT: usize = 200;
const DELETE_CHUNK: usize = 500;
const ENTITY: &str = "CacheKey";

/// Redis-backed cache scoped to one tenant namespace.
#[derive(Debug, Clone)]
pub struct RedisCache {
    connection: Arc<RedisConnection>,
    namespace: TenantNamespace,
    default_ttl: Duration,
    span: Span,
}

impl RedisCache {
    /// Creates a cache over `connection`.
    #[must_use]
    pub fn new(
        connection: Arc<RedisConnection>,
        namespace: TenantNamespace,
        default_ttl: Duration,
        span: Span,
    ) -> Self {
        Self {
            connection,
            namespace,
            default_ttl,
            span,
        }
    }

    /// The underlying connection.
    #[must_use]
    pub fn connection(&self) -> &Arc<RedisConnection> {
        &self.connection
    }

    async fn scan(&self, pattern: &str) -> RepositoryResult<Vec<String>> {
        let full_pattern = self.namespace.cache_key(pattern);
        let mut cursor: u64 = 0;
        let mut found = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = self
                .connection
                .run(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&full_pattern)
                        .arg("COUNT")
                        .arg(SCAN_COUNT),
                    "scan",
                )
                .await?;
            found.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once across iterations.
        found.sort_unstable();
        found.dedup();
        Ok(found)
    }
}

#[async_trait]
impl CacheRepository for RedisCache {
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
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.namespace.cache_key(key)).arg(payload.as_ref());
        if !ttl.is_zero() {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        self.connection.run::<()>(&cmd, "set").await
    }

    async fn get(&self, key: &str) -> RepositoryResult<CachedPayload> {
        let value: Option<Vec<u8>> = self
            .connection
            .run(redis::cmd("GET").arg(self.namespace.cache_key(key)), "get")
            .await?;
        value
            .map(CachedPayload::new)
            .ok_or_else(|| RepositoryError::not_found(ENTITY, key))
    }

    async fn delete(&self, key: &str) -> RepositoryResult<()> {
        self.connection
            .run::<i64>(redis::cmd("DEL").arg(self.namespace.cache_key(key)), "delete")
            .await
            .map(|_| ())
    }

    async fn exists(&self, key: &str) -> RepositoryResult<bool> {
        let count: i64 = self
            .connection
            .run(redis::cmd("EXISTS").arg(self.namespace.cache_key(key)), "exists")
            .await?;
        Ok(count > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> RepositoryResult<bool> {
        if ttl.is_zero() {
            let removed: i64 = self
                .connection
                .run(redis::cmd("DEL").arg(self.namespace.cache_key(key)), "expire")
                .await?;
            return Ok(removed > 0);
        }
        self.connection
            .run(
                redis::cmd("PEXPIRE")
                    .arg(self.namespace.cache_key(key))
                    .arg(ttl_millis(ttl)),
                "expire",
            )
            .await
    }

    async fn ttl(&self, key: &str) -> RepositoryResult<Option<Duration>> {
        let millis: i64 = self
            .connection
            .run(redis::cmd("PTTL").arg(self.namespace.cache_key(key)), "ttl")
            .await?;
        match millis {
            -2 => Err(RepositoryError::not_found(ENTITY, key)),
            -1 => Ok(None),
            ms => Ok(Some(Duration::from_millis(u64::try_from(ms).unwrap_or(0)))),
        }
    }

    async fn keys(&self, pattern: &str) -> RepositoryResult<Vec<String>> {
        let keys = self.scan(pattern).await?;
        Ok(keys
            .iter()
            .filter_map(|full| self.namespace.strip_cache_key(full))
            .map(str::to_string)
            .collect())
    }

    async fn delete_pattern(&self, pattern: &str) -> RepositoryResult<u64> {
        let keys = self.scan(pattern).await?;
        let mut removed = 0u64;
        for chunk in keys.chunks(DELETE_CHUNK) {
            let count: u64 = self
                .connection
                .run(redis::cmd("DEL").arg(chunk), "delete_pattern")
                .await?;
            removed += count;
        }
        tracing::debug!(parent: &self.span, pattern, removed, "deleted cache keys by pattern");
        Ok(removed)
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}
