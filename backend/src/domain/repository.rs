//! Typed repository facade over the key-value store.
//!
//! A [`Repository`] persists one record type: the primary hash at
//! `{Entity}:{id}`, collection membership in `{Entity}`, secondary indexes
//! through the [`IndexManager`] and reference sets through the
//! [`ReferenceResolver`]. Reads go through the [`QueryCache`]; writes
//! invalidate the entity's cached queries and refresh its point lookup.
//!
//! Cached values are field maps rather than decoded records, so a cached
//! read decodes exactly what an uncached read would.

use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use mockable::Clock;
use pagination::{Page, PageRequest};
use tracing::{debug, warn};

use crate::config::StoreSettings;
use crate::domain::ports::KeyValueStore;
use crate::domain::{
    CacheKey, Error, ErrorCode, FieldMap, IndexManager, KeyCodec, QueryCache, Record, RecordId,
    ReferenceField, ReferenceResolver,
};

/// Collaborators shared by every repository: the store, the query cache
/// and the cache entry lifetime.
#[derive(Clone)]
pub struct StoreContext {
    store: Arc<dyn KeyValueStore>,
    cache: QueryCache,
    cache_ttl: Duration,
}

impl StoreContext {
    /// Context over `store` with an explicit cache.
    pub fn new(store: Arc<dyn KeyValueStore>, cache: QueryCache, cache_ttl: Duration) -> Self {
        Self {
            store,
            cache,
            cache_ttl,
        }
    }

    /// Context whose cache shares `store` and follows `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::invalid_configuration`] when the configured cache
    /// prefix overlaps record keys; see [`QueryCache::new`].
    pub fn from_settings(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        settings: &StoreSettings,
    ) -> Result<Self, Error> {
        let cache = QueryCache::new(Arc::clone(&store), clock, settings.cache_prefix())?;
        Ok(Self::new(store, cache, settings.cache_ttl()))
    }

    /// Repository for record type `R`.
    pub fn repository<R: Record>(&self) -> Repository<R> {
        Repository::new(self.clone())
    }

    /// Shared query cache.
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }
}

/// Outcome of loading one referenced record.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedReference<C> {
    /// The referenced record exists.
    Found(C),
    /// The reference points at a record that no longer exists.
    Dangling(RecordId),
}

impl<C> ResolvedReference<C> {
    /// Loaded record, if the reference is not dangling.
    pub fn found(self) -> Option<C> {
        match self {
            Self::Found(record) => Some(record),
            Self::Dangling(_) => None,
        }
    }
}

/// Persistence operations for records of type `R`.
pub struct Repository<R> {
    context: StoreContext,
    index: IndexManager,
    references: ReferenceResolver,
    codec: KeyCodec,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for Repository<R> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            index: self.index.clone(),
            references: self.references.clone(),
            codec: self.codec,
            _record: PhantomData,
        }
    }
}

impl<R: Record> Repository<R> {
    /// Repository using the collaborators in `context`.
    pub fn new(context: StoreContext) -> Self {
        let store = Arc::clone(&context.store);
        Self {
            index: IndexManager::new(Arc::clone(&store)),
            references: ReferenceResolver::new(store),
            codec: KeyCodec::new(R::ENTITY),
            context,
            _record: PhantomData,
        }
    }

    fn store(&self) -> &dyn KeyValueStore {
        self.context.store.as_ref()
    }

    fn cache(&self) -> &QueryCache {
        &self.context.cache
    }

    fn not_found(id: &RecordId) -> Error {
        Error::not_found(format!("{} '{id}' does not exist", R::ENTITY))
    }

    fn reference(field: &str) -> Result<ReferenceField, Error> {
        R::reference_field(field).ok_or_else(|| {
            Error::invalid_query(format!("'{field}' is not a reference field of {}", R::ENTITY))
        })
    }

    async fn invalidate_queries(&self) -> Result<(), Error> {
        self.cache()
            .invalidate(&CacheKey::queries_of(R::ENTITY))
            .await?;
        Ok(())
    }

    /// Validate and write `record`, assigning an identifier when it has
    /// none. Saving an existing identifier replaces the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::invalid_record`] when validation fails and
    /// [`Error::store_unavailable`] when the store cannot be reached.
    pub async fn save(&self, mut record: R) -> Result<R, Error> {
        record.validate()?;
        let id = match record.id() {
            Some(id) => id.clone(),
            None => {
                let id = RecordId::generate();
                record.assign_id(id.clone());
                id
            }
        };
        let fields = record.to_fields();

        self.store()
            .hash_replace(&self.codec.record_key(&id), &fields)
            .await?;
        self.store()
            .set_add(&self.codec.collection_key(), id.as_ref())
            .await?;
        self.index
            .put(R::ENTITY, &id, R::INDEXED_FIELDS, &fields)
            .await?;
        self.invalidate_queries().await?;
        self.cache()
            .put(&CacheKey::record(R::ENTITY, &id), &fields, self.context.cache_ttl)
            .await?;

        debug!(entity = %R::ENTITY, %id, "record saved");
        Ok(record)
    }

    /// Save each record in order.
    ///
    /// # Errors
    ///
    /// Stops at the first failing save; earlier records stay written.
    pub async fn save_all(&self, records: impl IntoIterator<Item = R>) -> Result<Vec<R>, Error> {
        let mut saved = Vec::new();
        for record in records {
            saved.push(self.save(record).await?);
        }
        Ok(saved)
    }

    /// Load the record stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::not_found`] when no such record exists and
    /// [`Error::decode`] when the stored fields cannot be read.
    pub async fn find_by_id(&self, id: &RecordId) -> Result<R, Error> {
        let store = Arc::clone(&self.context.store);
        let key = self.codec.record_key(id);
        let fields: Option<FieldMap> = self
            .cache()
            .get_or_compute(
                &CacheKey::record(R::ENTITY, id),
                self.context.cache_ttl,
                move || async move { store.hash_get_all(&key).await.map_err(Error::from) },
            )
            .await?;
        let fields = fields.ok_or_else(|| Self::not_found(id))?;
        Ok(R::from_fields(&fields)?)
    }

    /// Whether a record is stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::store_unavailable`] when the store cannot be reached.
    pub async fn exists(&self, id: &RecordId) -> Result<bool, Error> {
        Ok(self.store().exists(&self.codec.record_key(id)).await?)
    }

    /// Number of stored records.
    ///
    /// # Errors
    ///
    /// Returns [`Error::store_unavailable`] when the store cannot be reached.
    pub async fn count(&self) -> Result<usize, Error> {
        Ok(self.store().set_len(&self.codec.collection_key()).await?)
    }

    /// Every stored record, ordered by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::decode`] when a stored record cannot be read and
    /// [`Error::store_unavailable`] when the store cannot be reached.
    pub async fn find_all(&self) -> Result<Vec<R>, Error> {
        let store = Arc::clone(&self.context.store);
        let codec = self.codec;
        let loaded: Option<Vec<FieldMap>> = self
            .cache()
            .get_or_compute(
                &CacheKey::query(R::ENTITY, "all", &[]),
                self.context.cache_ttl,
                move || async move {
                    let ids = collection_ids(store.as_ref(), codec).await?;
                    Ok::<_, Error>(Some(load_fields(store.as_ref(), codec, ids).await?))
                },
            )
            .await?;
        decode_all(loaded.unwrap_or_default())
    }

    /// Page `page_number` of `page_size` records, ordered by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::invalid_page_request`] when `page_size` is zero.
    pub async fn find_page(&self, page_number: usize, page_size: usize) -> Result<Page<R>, Error> {
        let request = PageRequest::new(page_number, page_size)?;
        let page_param = request.page().to_string();
        let size_param = request.size().to_string();
        let key = CacheKey::query(
            R::ENTITY,
            "page",
            &[("page", page_param.as_str()), ("size", size_param.as_str())],
        );

        let store = Arc::clone(&self.context.store);
        let codec = self.codec;
        let page: Option<Page<FieldMap>> = self
            .cache()
            .get_or_compute(&key, self.context.cache_ttl, move || async move {
                let ids = collection_ids(store.as_ref(), codec).await?;
                let slice = Page::slice(&ids, request);
                let loaded = load_fields(store.as_ref(), codec, slice.content().to_vec()).await?;
                Ok::<_, Error>(Some(slice.with_content(loaded)))
            })
            .await?;
        let page = page.unwrap_or_else(|| Page::slice(&[], request));
        Ok(page.try_map(|fields| R::from_fields(&fields))?)
    }

    /// Records whose indexed `field` equals `value`, ordered by identifier.
    ///
    /// Index members whose record is gone or no longer carries `value` are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::invalid_query`] when `field` is not indexed for `R`.
    pub async fn find_by_index(&self, field: &str, value: &str) -> Result<Vec<R>, Error> {
        if !R::is_indexed(field) {
            return Err(Error::invalid_query(format!(
                "'{field}' is not an indexed field of {}",
                R::ENTITY
            )));
        }
        let key = CacheKey::query(R::ENTITY, "by_index", &[("field", field), ("value", value)]);

        let store = Arc::clone(&self.context.store);
        let index = self.index.clone();
        let codec = self.codec;
        let field_name = field.to_owned();
        let wanted = value.to_owned();
        let loaded: Option<Vec<FieldMap>> = self
            .cache()
            .get_or_compute(&key, self.context.cache_ttl, move || async move {
                let ids: BTreeSet<RecordId> = index
                    .lookup(codec.entity(), &field_name, &wanted)
                    .await?
                    .into_iter()
                    .collect();
                let candidates = load_fields(store.as_ref(), codec, ids).await?;
                let matching = candidates
                    .into_iter()
                    .filter(|fields| {
                        let current = fields.get(&field_name);
                        let fresh = current == Some(&wanted);
                        if !fresh {
                            warn!(
                                entity = %codec.entity(),
                                field = %field_name,
                                value = %wanted,
                                current = ?current,
                                "skipping stale index member"
                            );
                        }
                        fresh
                    })
                    .collect();
                Ok::<_, Error>(Some(matching))
            })
            .await?;
        decode_all(loaded.unwrap_or_default())
    }

    /// First record, by identifier, whose indexed `field` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::invalid_query`] when `field` is not indexed for `R`.
    pub async fn find_first_by_index(&self, field: &str, value: &str) -> Result<Option<R>, Error> {
        Ok(self.find_by_index(field, value).await?.into_iter().next())
    }

    /// Delete the record stored under `id` along with its index entries.
    ///
    /// Records referencing it are left untouched. Returns whether a record
    /// existed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::store_unavailable`] when the store cannot be reached.
    pub async fn delete(&self, id: &RecordId) -> Result<bool, Error> {
        let existed = self.store().delete(&self.codec.record_key(id)).await?;
        self.store()
            .set_remove(&self.codec.collection_key(), id.as_ref())
            .await?;
        self.index.remove(R::ENTITY, id).await?;
        self.invalidate_queries().await?;
        self.cache().evict(&CacheKey::record(R::ENTITY, id)).await?;
        debug!(entity = %R::ENTITY, %id, existed, "record deleted");
        Ok(existed)
    }

    /// Add `child` to the `field` reference set of `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::invalid_query`] when `field` is not a reference
    /// field of `R` and [`Error::not_found`] when `parent` does not exist.
    pub async fn attach(&self, parent: &RecordId, field: &str, child: &RecordId) -> Result<(), Error> {
        let reference = Self::reference(field)?;
        self.references
            .attach(R::ENTITY, reference.name, parent, child)
            .await?;
        self.invalidate_queries().await?;
        self.cache().evict(&CacheKey::record(R::ENTITY, parent)).await
    }

    /// Remove `child` from the `field` reference set of `parent`.
    ///
    /// Returns whether the reference was present.
    ///
    /// # Errors
    ///
    /// Same as [`Repository::attach`].
    pub async fn detach(&self, parent: &RecordId, field: &str, child: &RecordId) -> Result<bool, Error> {
        let reference = Self::reference(field)?;
        let removed = self
            .references
            .detach(R::ENTITY, reference.name, parent, child)
            .await?;
        self.invalidate_queries().await?;
        self.cache()
            .evict(&CacheKey::record(R::ENTITY, parent))
            .await?;
        Ok(removed)
    }

    /// Identifiers in the `field` reference set of `parent`, dangling ones
    /// included.
    ///
    /// # Errors
    ///
    /// Same as [`Repository::attach`].
    pub async fn resolve(&self, parent: &RecordId, field: &str) -> Result<BTreeSet<RecordId>, Error> {
        let reference = Self::reference(field)?;
        self.references
            .resolve(R::ENTITY, reference.name, parent)
            .await
    }

    /// Load every record in the `field` reference set of `parent`.
    ///
    /// Missing children are reported as [`ResolvedReference::Dangling`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::invalid_query`] when `field` does not reference
    /// records of type `C`.
    pub async fn resolve_records<C: Record>(
        &self,
        parent: &RecordId,
        field: &str,
    ) -> Result<Vec<ResolvedReference<C>>, Error> {
        let reference = Self::reference(field)?;
        if reference.target != C::ENTITY {
            return Err(Error::invalid_query(format!(
                "'{field}' of {} references {}, not {}",
                R::ENTITY,
                reference.target,
                C::ENTITY
            )));
        }
        let children = self.context.repository::<C>();
        let mut resolved = Vec::new();
        for child in self.resolve(parent, field).await? {
            match children.find_by_id(&child).await {
                Ok(record) => resolved.push(ResolvedReference::Found(record)),
                Err(err) if err.code() == ErrorCode::NotFound => {
                    debug!(entity = %R::ENTITY, %parent, %child, field, "dangling reference");
                    resolved.push(ResolvedReference::Dangling(child));
                }
                Err(err) => return Err(err),
            }
        }
        Ok(resolved)
    }
}

async fn collection_ids(store: &dyn KeyValueStore, codec: KeyCodec) -> Result<Vec<RecordId>, Error> {
    let members = store.set_members(&codec.collection_key()).await?;
    Ok(members
        .into_iter()
        .filter_map(|member| match RecordId::new(member.as_str()) {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(entity = %codec.entity(), %member, error = %err, "skipping malformed collection member");
                None
            }
        })
        .collect())
}

async fn load_fields(
    store: &dyn KeyValueStore,
    codec: KeyCodec,
    ids: impl IntoIterator<Item = RecordId>,
) -> Result<Vec<FieldMap>, Error> {
    let mut loaded = Vec::new();
    for id in ids {
        match store.hash_get_all(&codec.record_key(&id)).await? {
            Some(fields) => loaded.push(fields),
            None => warn!(entity = %codec.entity(), %id, "skipping member without a stored record"),
        }
    }
    Ok(loaded)
}

fn decode_all<R: Record>(loaded: Vec<FieldMap>) -> Result<Vec<R>, Error> {
    loaded
        .iter()
        .map(|fields| R::from_fields(fields).map_err(Error::from))
        .collect()
}

#[cfg(test)]
mod tests;
