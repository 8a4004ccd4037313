//! # Cache
//!
//! Namespaced key/value storage with per-key TTL.
//!
//! - [`CacheRepository`]: the port used by callers and by the service registry
//! - [`RedisCache`]: Redis implementation over a shared [`RedisConnection`]
//! - [`InMemoryCache`]: in-process implementation for testing

pub mod in_memory;
pub mod redis_cache;
pub mod redis_client;
pub mod traits;

pub use in_memory::InMemoryCache;
pub use redis_cache::RedisCache;
pub use redis_client::RedisConnection;
pub use traits::{CacheRepository, CacheValue, CachedPayload};
