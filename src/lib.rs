//! # Exchange Data Adapter
//!
//! Persistence boundary for exchange simulators: ledger repositories for
//! accounts, orders, trades and balances on PostgreSQL, a namespaced cache
//! and a lease-based service registry on Redis.
//!
//! Several simulator instances can share one database and one cache
//! cluster. Each instance derives its own schema and cache namespace from
//! its service identity, so their data never collides:
//!
//! ```
//! use exchange_data_adapter::infrastructure::namespace::TenantNamespace;
//!
//! let okx = TenantNamespace::derive("exchange-simulator", "exchange-OKX-Primary");
//! assert_eq!(okx.schema(), "exchange_okx");
//! assert_eq!(okx.cache_namespace(), "exchange:OKX");
//! ```
//!
//! ## Layout
//!
//! - [`domain`]: ledger records, the order lifecycle and query criteria
//! - [`infrastructure`]: store adapters, configuration and telemetry
//! - [`adapter`]: the [`ExchangeDataAdapter`] facade

pub mod adapter;
pub mod domain;
pub mod infrastructure;

pub use adapter::{AdapterError, ExchangeDataAdapter};
pub use infrastructure::config::AdapterConfig;
pub use infrastructure::namespace::TenantNamespace;
pub use infrastructure::persistence::{RepositoryError, RepositoryResult};
