//! Secondary indexes kept in lockstep with record writes.
//!
//! Each index entry is a store set `{Entity}:idx:{field}:{value}` holding
//! the identifiers whose `field` equals `value`. A per-record tracking set
//! `{Entity}:{id}:idx` lists the entries the record currently belongs to, so
//! updates and deletes never need the previous version of the record.
//!
//! ## Invariants
//! - A changed value moves the identifier with one atomic set-move, so no
//!   reader observes it in both entries or in neither.
//! - The tracking set is extended before a membership is added and shrunk
//!   after one is removed; after a crash it is a superset of the real
//!   memberships, which keeps `remove` complete.
//! - Identifier sets carry no ordering.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::ports::KeyValueStore;
use crate::domain::{EntityType, Error, FieldMap, KeyCodec, RecordId};

/// Maintains and queries secondary indexes.
#[derive(Clone)]
pub struct IndexManager {
    store: Arc<dyn KeyValueStore>,
}

impl IndexManager {
    /// Manager writing index sets through `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Bring the index entries of `id` in line with `fields`.
    ///
    /// Fields missing from `fields`, or holding an empty value, leave the
    /// record out of that field's index.
    pub async fn put(
        &self,
        entity: EntityType,
        id: &RecordId,
        indexed_fields: &[&str],
        fields: &FieldMap,
    ) -> Result<(), Error> {
        if indexed_fields.is_empty() {
            return Ok(());
        }
        let codec = KeyCodec::new(entity);
        let tracking = codec.tracking_key(id);
        let current = self.store.set_members(&tracking).await?;

        for field in indexed_fields {
            let prefix = codec.index_field_prefix(field);
            let stale: Vec<&String> = current.iter().filter(|key| key.starts_with(&prefix)).collect();
            let target = fields
                .get(*field)
                .filter(|value| !value.is_empty())
                .map(|value| codec.index_key(field, value));

            match target {
                Some(target) => self.place(&tracking, id, &stale, &target).await?,
                None => self.clear(&tracking, id, &stale).await?,
            }
        }
        Ok(())
    }

    async fn place(
        &self,
        tracking: &str,
        id: &RecordId,
        stale: &[&String],
        target: &str,
    ) -> Result<(), Error> {
        let member = id.as_ref();
        self.store.set_add(tracking, target).await?;

        let mut placed = false;
        for old in stale.iter().filter(|key| key.as_str() != target) {
            if placed {
                self.store.set_remove(old, member).await?;
            } else {
                placed = self.store.set_move(old, target, member).await?;
                debug!(%id, from = %old, to = %target, moved = placed, "index entry moved");
            }
            self.store.set_remove(tracking, old).await?;
        }
        if !placed {
            self.store.set_add(target, member).await?;
        }
        Ok(())
    }

    async fn clear(&self, tracking: &str, id: &RecordId, stale: &[&String]) -> Result<(), Error> {
        for old in stale {
            self.store.set_remove(old, id.as_ref()).await?;
            self.store.set_remove(tracking, old).await?;
        }
        Ok(())
    }

    /// Remove `id` from every index entry it belongs to.
    pub async fn remove(&self, entity: EntityType, id: &RecordId) -> Result<(), Error> {
        let tracking = KeyCodec::new(entity).tracking_key(id);
        let entries = self.store.set_members(&tracking).await?;
        for entry in &entries {
            self.store.set_remove(entry, id.as_ref()).await?;
        }
        self.store.delete(&tracking).await?;
        debug!(%entity, %id, entries = entries.len(), "index entries removed");
        Ok(())
    }

    /// Identifiers whose `field` equals `value`; empty when none match.
    pub async fn lookup(
        &self,
        entity: EntityType,
        field: &str,
        value: &str,
    ) -> Result<HashSet<RecordId>, Error> {
        let key = KeyCodec::new(entity).index_key(field, value);
        let members = self.store.set_members(&key).await?;
        Ok(members
            .into_iter()
            .filter_map(|member| match RecordId::new(member.as_str()) {
                Ok(id) => Some(id),
                Err(err) => {
                    warn!(%key, %member, error = %err, "skipping malformed index member");
                    None
                }
            })
            .collect())
    }
}
