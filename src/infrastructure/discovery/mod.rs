//! # Service Discovery
//!
//! TTL-leased registration of running service instances.

pub mod registry;

pub use registry::{DEFAULT_LEASE, DecodeError, ServiceDiscovery, ServiceRegistry, ServiceScan};
