//! # Infrastructure Layer
//!
//! Store adapters and the ambient plumbing around them.
//!
//! - [`namespace`]: tenant schema and cache namespace derivation
//! - [`persistence`]: ledger repositories (PostgreSQL and in-memory)
//! - [`cache`]: namespaced key/value store with TTL (Redis and in-memory)
//! - [`discovery`]: lease-based service registry on top of the cache
//! - [`config`]: environment-driven configuration
//! - [`telemetry`]: tracing subscriber setup and component spans

pub mod cache;
pub mod config;
pub mod discovery;
pub mod namespace;
pub mod persistence;
pub mod telemetry;
