//! Multi-valued references between records.
//!
//! A reference set lives inside the parent's hash as one field per child,
//! `{field}.[{childId}] = childId`. Attaching writes that single field, so
//! repeated attaches are idempotent and never race with a full record
//! rewrite of other fields. The write only lands while the parent exists;
//! attaching to a parent deleted mid-call fails instead of leaving a stub
//! hash. Children are not checked for existence; a deleted child stays in
//! the set until detached.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::domain::fields::element_field;
use crate::domain::ports::KeyValueStore;
use crate::domain::{EntityType, Error, FieldReader, KeyCodec, RecordId};

/// Reads and writes reference sets stored in parent hashes.
#[derive(Clone)]
pub struct ReferenceResolver {
    store: Arc<dyn KeyValueStore>,
}

impl ReferenceResolver {
    /// Resolver operating on `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn missing_parent(entity: EntityType, parent: &RecordId) -> Error {
        Error::not_found(format!("{entity} '{parent}' does not exist"))
    }

    async fn require_parent(&self, entity: EntityType, parent: &RecordId) -> Result<String, Error> {
        let key = KeyCodec::new(entity).record_key(parent);
        if self.store.exists(&key).await? {
            Ok(key)
        } else {
            Err(Self::missing_parent(entity, parent))
        }
    }

    /// Add `child` to the `field` reference set of `parent`.
    pub async fn attach(
        &self,
        entity: EntityType,
        field: &str,
        parent: &RecordId,
        child: &RecordId,
    ) -> Result<(), Error> {
        let key = KeyCodec::new(entity).record_key(parent);
        let added = self
            .store
            .hash_set_existing_field(&key, &element_field(field, child), child.as_ref())
            .await?
            .ok_or_else(|| Self::missing_parent(entity, parent))?;
        debug!(%entity, %parent, %child, field, added, "reference attached");
        Ok(())
    }

    /// Remove `child` from the `field` reference set of `parent`.
    ///
    /// Returns whether the reference was present.
    pub async fn detach(
        &self,
        entity: EntityType,
        field: &str,
        parent: &RecordId,
        child: &RecordId,
    ) -> Result<bool, Error> {
        let key = self.require_parent(entity, parent).await?;
        let removed = self
            .store
            .hash_delete_field(&key, &element_field(field, child))
            .await?;
        debug!(%entity, %parent, %child, field, removed, "reference detached");
        Ok(removed)
    }

    /// Identifiers attached to `parent` under `field`, dangling ones
    /// included.
    pub async fn resolve(
        &self,
        entity: EntityType,
        field: &str,
        parent: &RecordId,
    ) -> Result<BTreeSet<RecordId>, Error> {
        let key = KeyCodec::new(entity).record_key(parent);
        let fields = self
            .store
            .hash_get_all(&key)
            .await?
            .ok_or_else(|| Self::missing_parent(entity, parent))?;
        Ok(FieldReader::new(entity, &fields).reference_set(field)?)
    }
}
