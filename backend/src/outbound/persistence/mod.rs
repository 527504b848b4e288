//! Key-value store adapters.
//!
//! Concrete implementations of the domain [`KeyValueStore`] port:
//!
//! - **Redis**: [`RedisStore`] over a `bb8-redis` connection pool, with an
//!   operation timeout on every command.
//! - **In-memory**: [`InMemoryStore`], a process-local map with lazy TTL
//!   expiry, used by tests and single-process deployments.
//!
//! Adapters only translate between store commands and the port; record
//! mapping, indexing and caching live in the domain.
//!
//! # Example
//!
//! ```no_run
//! use bookstore::StoreSettings;
//! use bookstore::outbound::persistence::RedisStore;
//!
//! # fn connect(settings: &StoreSettings) -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisStore::from_settings(settings)?;
//! # drop(store);
//! # Ok(())
//! # }
//! ```
//!
//! [`KeyValueStore`]: crate::domain::ports::KeyValueStore

mod memory_store;
mod pool;
mod redis_store;

pub use memory_store::InMemoryStore;
pub use pool::{PoolError, RedisPool, RedisPoolConfig};
pub use redis_store::RedisStore;
