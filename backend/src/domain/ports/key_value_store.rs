//! Port abstraction for the key-value backend holding records, indexes and
//! cached query results.
//!
//! The record store depends only on strings, hashes and sets. Every method
//! is a single-key operation except [`KeyValueStore::set_move`], which maps
//! to an atomic primitive (`SMOVE`) on backends that support it.
//! [`KeyValueStore::hash_set_existing_field`] checks and writes in one step,
//! so a hash deleted concurrently is never recreated.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::FieldMap;

use super::define_port_error;

define_port_error! {
    /// Errors raised by key-value store adapters.
    pub enum KeyValueStoreError {
        /// Backend timed out or the connection could not be used.
        Unavailable { message: String } => "key-value store unavailable: {message}"; retryable,
        /// Backend rejected or failed the command.
        Backend { message: String } => "key-value store command failed: {message}",
    }
}

/// Key-value store consumed by the record store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a string value.
    async fn get(&self, key: &str) -> Result<Option<String>, KeyValueStoreError>;

    /// Write a string value, optionally expiring after `ttl`.
    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), KeyValueStoreError>;

    /// Delete a key of any type. Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, KeyValueStoreError>;

    /// Whether a key of any type exists.
    async fn exists(&self, key: &str) -> Result<bool, KeyValueStoreError>;

    /// List keys starting with `prefix`, in no particular order.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, KeyValueStoreError>;

    /// Read every field of a hash. Missing hashes read as `None`.
    async fn hash_get_all(&self, key: &str) -> Result<Option<FieldMap>, KeyValueStoreError>;

    /// Atomically replace a hash with exactly `fields`.
    async fn hash_replace(&self, key: &str, fields: &FieldMap) -> Result<(), KeyValueStoreError>;

    /// Set one field of an existing hash, atomically with the existence
    /// check.
    ///
    /// Returns `None`, writing nothing, when the hash does not exist;
    /// otherwise whether the field was newly created.
    async fn hash_set_existing_field(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<bool>, KeyValueStoreError>;

    /// Delete one hash field. Returns whether the field existed.
    async fn hash_delete_field(&self, key: &str, field: &str) -> Result<bool, KeyValueStoreError>;

    /// Add a set member. Returns whether the member was newly added.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, KeyValueStoreError>;

    /// Remove a set member. Returns whether the member was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, KeyValueStoreError>;

    /// Atomically move `member` from `source` to `destination`.
    ///
    /// Returns `false`, leaving both sets untouched, when `member` is not in
    /// `source`.
    async fn set_move(
        &self,
        source: &str,
        destination: &str,
        member: &str,
    ) -> Result<bool, KeyValueStoreError>;

    /// Every member of a set; empty when the set does not exist.
    async fn set_members(&self, key: &str) -> Result<BTreeSet<String>, KeyValueStoreError>;

    /// Cardinality of a set; zero when the set does not exist.
    async fn set_len(&self, key: &str) -> Result<usize, KeyValueStoreError>;
}
