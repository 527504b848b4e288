//! Domain records and the services persisting them.
//!
//! Purpose: Define the bookstore records and the store-agnostic machinery
//! that persists them as hashes with secondary indexes, reference sets and
//! cached queries. Infrastructure is reached only through the ports in
//! [`ports`].
//!
//! Public surface:
//! - Error, ErrorCode: failure payload with a stable code.
//! - Record, RecordId: the record contract and identifier type.
//! - KeyCodec, EntityType: key layout.
//! - Repository, StoreContext: per-type persistence facade.
//! - QueryCache, CacheKey: single-flight TTL cache.
//! - Role, User, Category, Book, BookRating: the persisted records.

pub mod bootstrap;
pub mod error;
pub mod fields;
pub mod index_manager;
pub mod keys;
pub mod ports;
pub mod query_cache;
pub mod record;
pub mod reference_resolver;
pub mod repository;

pub mod book;
pub mod book_rating;
pub mod category;
pub mod role;
pub mod user;

pub use self::bootstrap::{ADMIN_EMAIL, ADMIN_NAME, ADMIN_ROLE, Bootstrap, CUSTOMER_ROLE, SeedUser};
pub use self::error::{Error, ErrorCode};
pub use self::fields::{DecodeError, FieldMap, FieldReader, FieldWriter};
pub use self::index_manager::IndexManager;
pub use self::keys::{EntityType, KeyCodec};
pub use self::query_cache::{CacheKey, DEFAULT_CACHE_PREFIX, DEFAULT_CACHE_TTL, QueryCache};
pub use self::record::{Record, RecordId, RecordIdError, ReferenceField};
pub use self::reference_resolver::ReferenceResolver;
pub use self::repository::{Repository, ResolvedReference, StoreContext};

pub use self::book::Book;
pub use self::book_rating::BookRating;
pub use self::category::Category;
pub use self::role::Role;
pub use self::user::{User, UserValidationError};

/// Result alias for domain operations.
pub type StoreResult<T> = Result<T, Error>;
