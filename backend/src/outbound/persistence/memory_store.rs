//! Process-local [`KeyValueStore`] for tests and single-process use.
//!
//! Mirrors the Redis semantics the record store relies on: strings, hashes
//! and sets share one keyspace, using a key as the wrong kind is an error,
//! and emptying a hash or set removes its key. Expiry is evaluated lazily
//! against the injected clock whenever a key is touched.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use mockable::{Clock, DefaultClock};

use crate::domain::FieldMap;
use crate::domain::ports::{KeyValueStore, KeyValueStoreError};

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Hash(FieldMap),
    Set(BTreeSet<String>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "string",
            Self::Hash(_) => "hash",
            Self::Set(_) => "set",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Text(_) => false,
            Self::Hash(fields) => fields.is_empty(),
            Self::Set(members) => members.is_empty(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

fn wrong_type(key: &str, found: &Value, wanted: &str) -> KeyValueStoreError {
    KeyValueStoreError::backend(format!(
        "WRONGTYPE key '{key}' holds a {} where a {wanted} was expected",
        found.kind()
    ))
}

struct Keyspace<'a> {
    now: DateTime<Utc>,
    entries: MutexGuard<'a, HashMap<String, Entry>>,
}

impl Keyspace<'_> {
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = self.now;
        if self
            .entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .is_some_and(|expires_at| expires_at <= now)
        {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn hash(&mut self, key: &str) -> Result<Option<&mut FieldMap>, KeyValueStoreError> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => Ok(Some(fields)),
            Some(entry) => Err(wrong_type(key, &entry.value, "hash")),
        }
    }

    fn set(&mut self, key: &str) -> Result<Option<&mut BTreeSet<String>>, KeyValueStoreError> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => Ok(Some(members)),
            Some(entry) => Err(wrong_type(key, &entry.value, "set")),
        }
    }

    fn set_or_create(&mut self, key: &str) -> Result<&mut BTreeSet<String>, KeyValueStoreError> {
        if self.set(key)?.is_none() {
            self.entries.insert(
                key.to_owned(),
                Entry {
                    value: Value::Set(BTreeSet::new()),
                    expires_at: None,
                },
            );
        }
        match self.entries.get_mut(key) {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => Ok(members),
            _ => Err(KeyValueStoreError::backend(format!("set '{key}' vanished"))),
        }
    }

    fn drop_if_empty(&mut self, key: &str) {
        if self.entries.get(key).is_some_and(|entry| entry.value.is_empty()) {
            self.entries.remove(key);
        }
    }
}

/// In-memory key-value store with lazy TTL expiry.
pub struct InMemoryStore {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Empty store driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(DefaultClock))
    }

    /// Empty store whose expiry follows `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn keyspace(&self) -> Keyspace<'_> {
        Keyspace {
            now: self.clock.utc(),
            entries: self.entries.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KeyValueStoreError> {
        match self.keyspace().live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(entry) => Err(wrong_type(key, &entry.value, "string")),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), KeyValueStoreError> {
        let mut keyspace = self.keyspace();
        let expires_at = match ttl {
            Some(ttl) => {
                let ttl = TimeDelta::from_std(ttl)
                    .map_err(|err| KeyValueStoreError::backend(format!("invalid ttl: {err}")))?;
                keyspace.now.checked_add_signed(ttl)
            }
            None => None,
        };
        keyspace.entries.insert(
            key.to_owned(),
            Entry {
                value: Value::Text(value.to_owned()),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, KeyValueStoreError> {
        let mut keyspace = self.keyspace();
        let existed = keyspace.live(key).is_some();
        keyspace.entries.remove(key);
        Ok(existed)
    }

    async fn exists(&self, key: &str) -> Result<bool, KeyValueStoreError> {
        Ok(self.keyspace().live(key).is_some())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, KeyValueStoreError> {
        let mut keyspace = self.keyspace();
        let now = keyspace.now;
        keyspace
            .entries
            .retain(|_, entry| entry.expires_at.is_none_or(|expires_at| expires_at > now));
        Ok(keyspace
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn hash_get_all(&self, key: &str) -> Result<Option<FieldMap>, KeyValueStoreError> {
        Ok(self.keyspace().hash(key)?.map(|fields| fields.clone()))
    }

    async fn hash_replace(&self, key: &str, fields: &FieldMap) -> Result<(), KeyValueStoreError> {
        let mut keyspace = self.keyspace();
        keyspace.entries.remove(key);
        if !fields.is_empty() {
            keyspace.entries.insert(
                key.to_owned(),
                Entry {
                    value: Value::Hash(fields.clone()),
                    expires_at: None,
                },
            );
        }
        Ok(())
    }

    async fn hash_set_existing_field(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<bool>, KeyValueStoreError> {
        let mut keyspace = self.keyspace();
        let added = keyspace
            .hash(key)?
            .map(|fields| fields.insert(field.to_owned(), value.to_owned()).is_none());
        Ok(added)
    }

    async fn hash_delete_field(&self, key: &str, field: &str) -> Result<bool, KeyValueStoreError> {
        let mut keyspace = self.keyspace();
        let removed = match keyspace.hash(key)? {
            Some(fields) => fields.remove(field).is_some(),
            None => false,
        };
        keyspace.drop_if_empty(key);
        Ok(removed)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, KeyValueStoreError> {
        Ok(self.keyspace().set_or_create(key)?.insert(member.to_owned()))
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, KeyValueStoreError> {
        let mut keyspace = self.keyspace();
        let removed = match keyspace.set(key)? {
            Some(members) => members.remove(member),
            None => false,
        };
        keyspace.drop_if_empty(key);
        Ok(removed)
    }

    async fn set_move(
        &self,
        source: &str,
        destination: &str,
        member: &str,
    ) -> Result<bool, KeyValueStoreError> {
        let mut keyspace = self.keyspace();
        // Redis checks both types before moving anything.
        keyspace.set(destination)?;
        let moved = match keyspace.set(source)? {
            Some(members) => members.remove(member),
            None => false,
        };
        if moved {
            keyspace.drop_if_empty(source);
            keyspace.set_or_create(destination)?.insert(member.to_owned());
        }
        Ok(moved)
    }

    async fn set_members(&self, key: &str) -> Result<BTreeSet<String>, KeyValueStoreError> {
        Ok(self
            .keyspace()
            .set(key)?
            .map(|members| members.clone())
            .unwrap_or_default())
    }

    async fn set_len(&self, key: &str) -> Result<usize, KeyValueStoreError> {
        Ok(self.keyspace().set(key)?.map_or(0, |members| members.len()))
    }
}
