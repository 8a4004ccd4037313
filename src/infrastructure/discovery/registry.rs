//! # Service Registry
//!
//! Lease-based service discovery on top of any [`CacheRepository`].
//!
//! Each registration writes two entries under the tenant namespace, both
//! carrying the same lease:
//!
//! - `service:<id>`: the JSON-encoded [`ServiceInfo`]
//! - `heartbeat:<id>`: the RFC 3339 time of the latest heartbeat
//!
//! A heartbeat pushes the lease of the service entry forward without
//! rewriting it and rewrites the heartbeat entry. A process that stops
//! heartbeating disappears once the lease lapses; nothing marks it dead
//! explicitly.

use crate::domain::entities::ServiceInfo;
use crate::domain::value_objects::timestamp;
use crate::infrastructure::cache::{CacheRepository, CacheValue};
use crate::infrastructure::persistence::traits::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::Span;

const ENTITY: &str = "Service";
const SERVICE_PREFIX: &str = "service:";
const HEARTBEAT_PREFIX: &str = "heartbeat:";

/// Default registry lease.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(90);

/// Registration and lookup of live service instances.
#[async_trait]
pub trait ServiceDiscovery: Send + Sync + fmt::Debug {
    /// Registers (or re-registers) an instance for one lease.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Validation` for a blank id or name.
    async fn register(&self, info: &ServiceInfo) -> RepositoryResult<()>;

    /// Extends the lease of a registered instance.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the instance is unknown or its
    /// lease already lapsed; the caller should register again.
    async fn heartbeat(&self, service_id: &str) -> RepositoryResult<()>;

    /// Removes an instance. Removing an unknown instance succeeds.
    async fn deregister(&self, service_id: &str) -> RepositoryResult<()>;

    /// Live instances of `service_name`.
    async fn discover(&self, service_name: &str) -> RepositoryResult<Vec<ServiceInfo>>;

    /// One live instance.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if absent or lapsed.
    async fn get(&self, service_id: &str) -> RepositoryResult<ServiceInfo>;

    /// Every live instance.
    async fn list(&self) -> RepositoryResult<Vec<ServiceInfo>>;
}

/// A registry record that could not be read during a scan.
#[derive(Debug, Error)]
#[error("unreadable service record '{key}': {source}")]
pub struct DecodeError {
    /// Cache key of the record, namespace stripped.
    pub key: String,
    /// Underlying failure.
    #[source]
    pub source: RepositoryError,
}

/// Lazy sequence of scanned registry records.
pub type ServiceScan<'a> = BoxStream<'a, Result<ServiceInfo, DecodeError>>;

/// [`ServiceDiscovery`] over a namespaced cache.
///
/// # Examples
///
/// ```
/// use exchange_data_adapter::domain::entities::ServiceInfo;
/// use exchange_data_adapter::infrastructure::cache::InMemoryCache;
/// use exchange_data_adapter::infrastructure::discovery::{ServiceDiscovery, ServiceRegistry};
/// use exchange_data_adapter::infrastructure::namespace::TenantNamespace;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache = InMemoryCache::new(TenantNamespace::new("exchange", "exchange"), Duration::from_secs(300));
/// let registry = ServiceRegistry::new(Arc::new(cache), Duration::from_secs(90), tracing::Span::none());
///
/// let info = ServiceInfo::new("matching-engine", "10.0.0.7", 7000, "1.4.2");
/// registry.register(&info).await.unwrap();
/// assert_eq!(registry.discover("matching-engine").await.unwrap().len(), 1);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    cache: Arc<dyn CacheRepository>,
    lease: Duration,
    span: Span,
}

impl ServiceRegistry {
    /// Creates a registry whose entries live for `lease` without a
    /// heartbeat.
    #[must_use]
    pub fn new(cache: Arc<dyn CacheRepository>, lease: Duration, span: Span) -> Self {
        Self { cache, lease, span }
    }

    /// Lease applied to every entry.
    #[must_use]
    pub fn lease(&self) -> Duration {
        self.lease
    }

    /// Streams every registry record currently present.
    ///
    /// Records that lapse between listing and reading are skipped silently;
    /// records that cannot be read or decoded are yielded as errors.
    ///
    /// # Errors
    ///
    /// Returns an error only if the key listing itself fails.
    pub async fn scan(&self) -> RepositoryResult<ServiceScan<'_>> {
        let keys = self.cache.keys(&format!("{SERVICE_PREFIX}*")).await?;
        let records = stream::iter(keys)
            .filter_map(move |key| async move {
                let service_id = key.strip_prefix(SERVICE_PREFIX)?.to_string();
                match self.read(&service_id).await {
                    Ok(info) => Some(Ok(info)),
                    Err(e) if e.is_not_found() => None,
                    Err(source) => Some(Err(DecodeError { key, source })),
                }
            })
            .boxed();
        Ok(records)
    }

    async fn collect_live(
        &self,
        keep: impl Fn(&ServiceInfo) -> bool + Send,
    ) -> RepositoryResult<Vec<ServiceInfo>> {
        let mut scan = self.scan().await?;
        let mut found = Vec::new();
        let mut skipped = 0usize;
        while let Some(record) = scan.next().await {
            match record {
                Ok(info) if keep(&info) => found.push(info),
                Ok(_) => {}
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(parent: &self.span, key = %e.key, error = %e.source, "skipping service record");
                }
            }
        }
        if skipped > 0 {
            tracing::debug!(parent: &self.span, skipped, returned = found.len(), "service scan finished with skipped records");
        }
        found.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        Ok(found)
    }

    async fn read(&self, service_id: &str) -> RepositoryResult<ServiceInfo> {
        let payload = self
            .cache
            .get(&service_key(service_id))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    RepositoryError::not_found(ENTITY, service_id)
                } else {
                    e
                }
            })?;
        let mut info: ServiceInfo = payload.decode()?;
        if let Some(at) = self.last_heartbeat(service_id).await? {
            info.last_heartbeat = at;
        }
        Ok(info)
    }

    async fn last_heartbeat(&self, service_id: &str) -> RepositoryResult<Option<DateTime<Utc>>> {
        match self.cache.get(&heartbeat_key(service_id)).await {
            Ok(payload) => {
                let text = payload.as_str()?;
                DateTime::parse_from_rfc3339(text)
                    .map(|at| Some(at.with_timezone(&Utc)))
                    .map_err(|e| {
                        RepositoryError::serialization(format!("heartbeat for {service_id}: {e}"))
                    })
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write_heartbeat(&self, service_id: &str, at: DateTime<Utc>) -> RepositoryResult<()> {
        self.cache
            .set(
                &heartbeat_key(service_id),
                CacheValue::Text(at.to_rfc3339()),
                Some(self.lease),
            )
            .await
    }
}

#[async_trait]
impl ServiceDiscovery for ServiceRegistry {
    async fn register(&self, info: &ServiceInfo) -> RepositoryResult<()> {
        info.validate()?;
        let now = timestamp::now();
        let mut record = info.clone();
        record.last_heartbeat = now;
        self.cache
            .set(
                &service_key(&record.service_id),
                CacheValue::json(&record)?,
                Some(self.lease),
            )
            .await?;
        self.write_heartbeat(&record.service_id, now).await?;
        tracing::info!(
            parent: &self.span,
            service_id = %record.service_id,
            service_name = %record.service_name,
            endpoint = %record.endpoint(),
            lease_secs = self.lease.as_secs(),
            "service registered"
        );
        Ok(())
    }

    async fn heartbeat(&self, service_id: &str) -> RepositoryResult<()> {
        if !self.cache.expire(&service_key(service_id), self.lease).await? {
            tracing::warn!(parent: &self.span, service_id, "heartbeat for unknown or lapsed service");
            return Err(RepositoryError::not_found(ENTITY, service_id));
        }
        self.write_heartbeat(service_id, timestamp::now()).await?;
        tracing::trace!(parent: &self.span, service_id, "heartbeat");
        Ok(())
    }

    async fn deregister(&self, service_id: &str) -> RepositoryResult<()> {
        self.cache.delete(&service_key(service_id)).await?;
        self.cache.delete(&heartbeat_key(service_id)).await?;
        tracing::info!(parent: &self.span, service_id, "service deregistered");
        Ok(())
    }

    async fn discover(&self, service_name: &str) -> RepositoryResult<Vec<ServiceInfo>> {
        self.collect_live(|info| info.service_name == service_name)
            .await
    }

    async fn get(&self, service_id: &str) -> RepositoryResult<ServiceInfo> {
        self.read(service_id).await
    }

    async fn list(&self) -> RepositoryResult<Vec<ServiceInfo>> {
        self.collect_live(|_| true).await
    }
}

fn service_key(service_id: &str) -> String {
    format!("{SERVICE_PREFIX}{service_id}")
}

fn heartbeat_key(service_id: &str) -> String {
    format!("{HEARTBEAT_PREFIX}{service_id}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::infrastructure::cache::InMemoryCache;
    use crate::infrastructure::namespace::TenantNamespace;

    const LEASE: Duration = Duration::from_secs(90);

    fn registry() -> (ServiceRegistry, InMemoryCache) {
        let cache = InMemoryCache::new(
            TenantNamespace::derive("exchange-simulator", "exchange-OKX"),
            Duration::from_secs(300),
        );
        let registry = ServiceRegistry::new(Arc::new(cache.clone()), LEASE, Span::none());
        (registry, cache)
    }

    fn engine(id: &str) -> ServiceInfo {
        ServiceInfo::new("matching-engine", "10.0.0.7", 7000, "1.4.2").with_id(id)
    }

    #[tokio::test(start_paused = true)]
    async fn register_then_discover() {
        let (registry, cache) = registry();
        registry.register(&engine("svc-1")).await.unwrap();

        let found = registry.discover("matching-engine").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].service_id, "svc-1");
        assert!(registry.discover("gateway").await.unwrap().is_empty());

        assert_eq!(cache.ttl("service:svc-1").await.unwrap(), Some(LEASE));
        assert_eq!(cache.ttl("heartbeat:svc-1").await.unwrap(), Some(LEASE));
    }

    #[tokio::test(start_paused = true)]
    async fn lapsed_lease_hides_service() {
        let (registry, _) = registry();
        registry.register(&engine("svc-1")).await.unwrap();

        tokio::time::advance(LEASE + Duration::from_secs(1)).await;
        assert!(registry.discover("matching-engine").await.unwrap().is_empty());
        assert!(registry.get("svc-1").await.unwrap_err().is_not_found());
        assert!(registry.heartbeat("svc-1").await.unwrap_err().is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_extends_past_original_lease() {
        let (registry, _) = registry();
        registry.register(&engine("svc-1")).await.unwrap();
        let registered = registry.get("svc-1").await.unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        registry.heartbeat("svc-1").await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;

        let info = registry.get("svc-1").await.unwrap();
        assert_eq!(info.registered_at, registered.registered_at);
        assert!(info.last_heartbeat >= registered.last_heartbeat);
        assert_eq!(registry.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deregister_is_idempotent() {
        let (registry, cache) = registry();
        registry.register(&engine("svc-1")).await.unwrap();
        registry.deregister("svc-1").await.unwrap();
        assert!(registry.get("svc-1").await.unwrap_err().is_not_found());
        registry.deregister("svc-1").await.unwrap();
        registry.deregister("never-registered").await.unwrap();
        assert!(cache.keys("*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_record_is_skipped() {
        let (registry, cache) = registry();
        registry.register(&engine("svc-1")).await.unwrap();
        registry.register(&engine("svc-2")).await.unwrap();
        cache
            .set("service:broken", "{not json".into(), Some(LEASE))
            .await
            .unwrap();

        let listed = registry.list().await.unwrap();
        let ids: Vec<_> = listed.iter().map(|s| s.service_id.as_str()).collect();
        assert_eq!(ids, vec!["svc-1", "svc-2"]);

        let scanned: Vec<_> = registry.scan().await.unwrap().collect().await;
        let failures: Vec<_> = scanned.iter().filter_map(|r| r.as_ref().err()).collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].key, "service:broken");
    }

    #[tokio::test]
    async fn blank_id_is_rejected() {
        let (registry, _) = registry();
        let err = registry.register(&engine("")).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn namespaces_do_not_see_each_other() {
        let (okx, cache) = registry();
        let binance = ServiceRegistry::new(
            Arc::new(cache.with_namespace(TenantNamespace::derive(
                "exchange-simulator",
                "exchange-Binance",
            ))),
            LEASE,
            Span::none(),
        );
        okx.register(&engine("svc-okx")).await.unwrap();
        binance.register(&engine("svc-binance")).await.unwrap();

        let okx_ids: Vec<_> = okx
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.service_id)
            .collect();
        assert_eq!(okx_ids, vec!["svc-okx".to_string()]);
        assert!(binance.get("svc-okx").await.unwrap_err().is_not_found());
    }
}
