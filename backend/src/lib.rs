//! Bookstore record store.
//!
//! Persists typed records as hashes in a key-value store, keeps secondary
//! indexes and reference sets beside them, and serves paginated and
//! indexed queries through a single-flight TTL cache.
//!
//! ```
//! use std::sync::Arc;
//!
//! use bookstore::domain::{Book, QueryCache, RecordId, StoreContext, DEFAULT_CACHE_TTL};
//! use bookstore::outbound::persistence::InMemoryStore;
//!
//! # tokio_test_block(async {
//! let store = Arc::new(InMemoryStore::new());
//! let cache = QueryCache::new(store.clone(), Arc::new(mockable::DefaultClock), "cache:")?;
//! let books = StoreContext::new(store, cache, DEFAULT_CACHE_TTL).repository::<Book>();
//!
//! let id = RecordId::new("9780134685991")?;
//! books.save(Book::new("Effective Java").with_id(id.clone())).await?;
//! assert_eq!(books.find_by_id(&id).await?.title(), "Effective Java");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).expect("example runs");
//! # fn tokio_test_block<F: std::future::Future>(future: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread()
//! #         .enable_all()
//! #         .build()
//! #         .expect("runtime")
//! #         .block_on(future)
//! # }
//! ```

pub mod config;
pub mod domain;
pub mod outbound;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::StoreSettings;
