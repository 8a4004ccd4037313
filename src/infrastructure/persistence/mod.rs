//! # Persistence Layer
//!
//! Ledger repositories for accounts, orders, trades and balances.
//!
//! ## Repository Traits (Ports)
//!
//! - [`AccountRepository`]: Account records and status changes
//! - [`OrderRepository`]: Orders and the order lifecycle
//! - [`TradeRepository`]: Append-only execution records
//! - [`BalanceRepository`]: Balances and atomic delta application
//!
//! ## Implementations
//!
//! - `postgres`: PostgreSQL implementations scoped to the tenant schema
//! - `in_memory`: In-memory implementations for testing

pub mod in_memory;
pub mod postgres;
pub mod traits;

pub use traits::{
    AccountRepository, BalanceRepository, OrderRepository, RepositoryError, RepositoryResult,
    TradeRepository,
};
