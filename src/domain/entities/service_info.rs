//! # Service Info
//!
//! A registered service instance. Its existence is lease-based: the record
//! lives as long as its registry entry is refreshed before the lease lapses.

use crate::domain::errors::{DomainResult, require_id};
use crate::domain::value_objects::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Service discovery record.
///
/// # Examples
///
/// ```
/// use exchange_data_adapter::domain::entities::ServiceInfo;
///
/// let info = ServiceInfo::new("exchange-simulator", "10.0.0.5", 8080, "1.0.0")
///     .with_metadata("venue", "OKX");
/// assert_eq!(info.endpoint(), "10.0.0.5:8080");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Unique instance identifier.
    pub service_id: String,
    /// Logical service name used for discovery.
    pub service_name: String,
    /// Host or IP address.
    pub address: String,
    /// Listening port.
    pub port: u16,
    /// Service version.
    pub version: String,
    /// Free-form labels.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// First registration time.
    pub registered_at: DateTime<Utc>,
    /// Latest heartbeat time.
    pub last_heartbeat: DateTime<Utc>,
}

impl ServiceInfo {
    /// Creates a record with a generated identifier.
    #[must_use]
    pub fn new(
        service_name: impl Into<String>,
        address: impl Into<String>,
        port: u16,
        version: impl Into<String>,
    ) -> Self {
        let now = timestamp::now();
        Self {
            service_id: Uuid::new_v4().to_string(),
            service_name: service_name.into(),
            address: address.into(),
            port,
            version: version.into(),
            metadata: HashMap::new(),
            registered_at: now,
            last_heartbeat: now,
        }
    }

    /// Sets the instance identifier.
    #[must_use]
    pub fn with_id(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = service_id.into();
        self
    }

    /// Adds a metadata label.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// `address:port`.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Checks identifiers before registration.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidIdentifier` if the id or name is blank.
    pub fn validate(&self) -> DomainResult<()> {
        require_id("service_id", &self.service_id)?;
        require_id("service_name", &self.service_name)
    }
}
