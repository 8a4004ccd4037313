//! # In-Memory Repositories
//!
//! In-memory implementations for testing without database dependencies.
//!
//! ## Available Repositories
//!
//! - [`InMemoryAccountRepository`]: Account persistence
//! - [`InMemoryOrderRepository`]: Order persistence and lifecycle
//! - [`InMemoryTradeRepository`]: Trade persistence
//! - [`InMemoryBalanceRepository`]: Balance persistence and delta application
//!
//! ## Thread Safety
//!
//! All implementations use `Arc<RwLock<HashMap>>` for thread-safe access.

pub mod account_repository;
pub mod balance_repository;
pub mod order_repository;
pub mod trade_repository;

pub use account_repository::InMemoryAccountRepository;
pub use balance_repository::InMemoryBalanceRepository;
pub use order_repository::InMemoryOrderRepository;
pub use trade_repository::InMemoryTradeRepository;
