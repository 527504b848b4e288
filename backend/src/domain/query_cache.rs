//! Time-bounded cache for query results with single-flight computation.
//!
//! Entries live in the key-value store under a configurable namespace as a
//! JSON envelope `{insertedAt, expiresAt, value}` and are written with a
//! store-side TTL as well. Concurrent misses for one key share a single
//! computation, which runs as its own task so callers that give up do not
//! cancel it.
//!
//! ## Invariants
//! - An entry is served only while `clock.utc() < expiresAt`.
//! - Absent results (`None`) and errors are never stored.
//! - A computation in flight when its key is invalidated, put or evicted
//!   never leaves its result behind. Write-backs and invalidations are
//!   ordered, so once `invalidate` returns no older result can reappear.
//! - Unreadable entries and failed cache reads or writes degrade to a miss.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use mockable::Clock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::domain::keys::KEY_SEPARATOR;
use crate::domain::ports::KeyValueStore;
use crate::domain::{EntityType, Error, RecordId};

/// Entry lifetime used when no other TTL is configured.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Namespace prepended to every cache key by default.
pub const DEFAULT_CACHE_PREFIX: &str = "cache:";

const QUERY_SEGMENT: &str = "q";
const RECORD_SEGMENT: &str = "r";

/// Cache key relative to the cache namespace.
///
/// Query keys take the form `{Entity}:q:{operation}?{params}` where the
/// parameters are form-urlencoded in name order, so distinct parameter
/// tuples never produce the same key. Point lookups use `{Entity}:r:{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for `operation` over `entity` with the given parameters.
    ///
    /// # Examples
    /// ```
    /// use bookstore::domain::{CacheKey, EntityType};
    ///
    /// let key = CacheKey::query(EntityType::BOOK, "page", &[("size", "10"), ("page", "2")]);
    /// assert_eq!(key.as_str(), "Book:q:page?page=2&size=10");
    /// ```
    pub fn query(entity: EntityType, operation: &str, params: &[(&str, &str)]) -> Self {
        let mut sorted = params.to_vec();
        sorted.sort_unstable();
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(sorted)
            .finish();
        Self(format!("{}{operation}?{encoded}", Self::queries_of(entity)))
    }

    /// Key for the point lookup of `id`.
    pub fn record(entity: EntityType, id: &RecordId) -> Self {
        Self(format!("{entity}{KEY_SEPARATOR}{RECORD_SEGMENT}{KEY_SEPARATOR}{id}"))
    }

    /// Prefix shared by every query key of `entity`.
    pub fn queries_of(entity: EntityType) -> String {
        format!("{entity}{KEY_SEPARATOR}{QUERY_SEGMENT}{KEY_SEPARATOR}")
    }

    /// Key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    inserted_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    value: Value,
}

type FlightOutput = Result<Option<Value>, Error>;
type FlightFuture = Shared<BoxFuture<'static, FlightOutput>>;

struct Flight {
    id: u64,
    stale: Arc<AtomicBool>,
    result: FlightFuture,
}

struct Inner {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    namespace: String,
    flights: Mutex<HashMap<String, Flight>>,
    next_flight: AtomicU64,
    // Write-backs hold it shared, invalidation and eviction exclusively.
    write_gate: RwLock<()>,
}

impl Inner {
    fn flights(&self) -> MutexGuard<'_, HashMap<String, Flight>> {
        // The map holds no invariant a panicking holder could break.
        self.flights
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn full_key(&self, key: &CacheKey) -> String {
        format!("{}{}", self.namespace, key.as_str())
    }

    async fn read(&self, full_key: &str) -> Option<Value> {
        let raw = match self.store.get(full_key).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(key = %full_key, error = %err, "cache read failed; treating as miss");
                return None;
            }
        };
        let envelope: Envelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(key = %full_key, error = %err, "undecodable cache entry; treating as miss");
                return None;
            }
        };
        if self.clock.utc() < envelope.expires_at {
            debug!(key = %full_key, "cache hit");
            Some(envelope.value)
        } else {
            debug!(key = %full_key, "cache entry expired");
            None
        }
    }

    async fn write(&self, full_key: &str, value: Value, ttl: Duration) {
        let inserted_at = self.clock.utc();
        let expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|ttl| inserted_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let envelope = Envelope {
            inserted_at,
            expires_at,
            value,
        };
        let raw = match serde_json::to_string(&envelope) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key = %full_key, error = %err, "cache entry not serializable");
                return;
            }
        };
        match self.store.set(full_key, &raw, Some(ttl)).await {
            Ok(()) => debug!(key = %full_key, ?ttl, "cache entry stored"),
            Err(err) => warn!(key = %full_key, error = %err, "cache write failed"),
        }
    }

    /// Mark flights matching `pred` stale and forget them.
    fn cancel_flights(&self, pred: impl Fn(&str) -> bool) -> usize {
        let mut flights = self.flights();
        let before = flights.len();
        flights.retain(|key, flight| {
            let matched = pred(key);
            if matched {
                flight.stale.store(true, Ordering::SeqCst);
            }
            !matched
        });
        before - flights.len()
    }

    fn finish_flight(&self, full_key: &str, id: u64) {
        let mut flights = self.flights();
        if flights.get(full_key).is_some_and(|flight| flight.id == id) {
            flights.remove(full_key);
        }
    }
}

fn check_namespace(namespace: &str) -> Result<(), Error> {
    if namespace.is_empty() {
        return Err(Error::invalid_configuration(
            "cache namespace must not be empty",
        ));
    }
    let shadowed = EntityType::REGISTERED.into_iter().find_map(|entity| {
        EntityType::from_key(&format!("{namespace}{entity}{KEY_SEPARATOR}"))
    });
    match shadowed {
        Some(entity) => Err(Error::invalid_configuration(format!(
            "cache namespace '{namespace}' overlaps the {entity} record keys"
        ))),
        None => Ok(()),
    }
}

/// Shared query cache; cloning yields another handle to the same cache.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl QueryCache {
    /// Cache storing entries in `store` under `namespace`.
    ///
    /// The namespace must keep cache keys out of the record keyspace: it
    /// may not be empty, and its first segment may not name a registered
    /// entity type. Otherwise invalidating `User:q:` would also delete
    /// `User:q:idx`, the index tracking set of a user with id `q`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::invalid_configuration`] for a namespace that
    /// overlaps record keys.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        namespace: impl Into<String>,
    ) -> Result<Self, Error> {
        let namespace = namespace.into();
        check_namespace(&namespace)?;
        Ok(Self {
            inner: Arc::new(Inner {
                store,
                clock,
                namespace,
                flights: Mutex::new(HashMap::new()),
                next_flight: AtomicU64::new(0),
                write_gate: RwLock::new(()),
            }),
        })
    }

    /// Namespace prepended to every key.
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Live cached value for `key`, if any.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let full_key = self.inner.full_key(key);
        let value = self.inner.read(&full_key).await?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                warn!(key = %full_key, error = %err, "cached value has unexpected shape; treating as miss");
                None
            }
        }
    }

    /// Return the live entry for `key` or compute, store and return it.
    ///
    /// Concurrent callers for the same key share one computation. The
    /// computation runs to completion even when every caller goes away.
    ///
    /// # Errors
    ///
    /// Returns the computation's error to every caller sharing it. Errors
    /// are not cached.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        compute: F,
    ) -> Result<Option<T>, Error>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, Error>> + Send + 'static,
    {
        if let Some(hit) = self.get(key).await {
            return Ok(Some(hit));
        }

        let full_key = self.inner.full_key(key);
        let flight = self.join_or_start(&full_key, ttl, compute);
        match flight.await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|err| Error::internal(format!("cached value has unexpected shape: {err}"))),
            None => Ok(None),
        }
    }

    fn join_or_start<T, F, Fut>(&self, full_key: &str, ttl: Duration, compute: F) -> FlightFuture
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, Error>> + Send + 'static,
    {
        let mut flights = self.inner.flights();
        if let Some(flight) = flights.get(full_key) {
            debug!(key = %full_key, "joining in-flight computation");
            return flight.result.clone();
        }

        let id = self.inner.next_flight.fetch_add(1, Ordering::Relaxed);
        let stale = Arc::new(AtomicBool::new(false));
        let computation = compute();
        let task = tokio::spawn({
            let inner = Arc::clone(&self.inner);
            let stale = Arc::clone(&stale);
            let full_key = full_key.to_owned();
            async move {
                // A flight that finished after this caller's miss may have
                // filled the entry already.
                if let Some(value) = inner.read(&full_key).await {
                    inner.finish_flight(&full_key, id);
                    return Ok(Some(value));
                }
                let result = computation.await.and_then(|value| {
                    value
                        .map(serde_json::to_value)
                        .transpose()
                        .map_err(|err| Error::internal(format!("result not serializable: {err}")))
                });
                if let Ok(Some(value)) = &result {
                    let _gate = inner.write_gate.read().await;
                    if stale.load(Ordering::SeqCst) {
                        debug!(key = %full_key, flight = id, "dropping result of invalidated computation");
                    } else {
                        inner.write(&full_key, value.clone(), ttl).await;
                    }
                }
                inner.finish_flight(&full_key, id);
                result
            }
        });
        let result = async move {
            task.await
                .unwrap_or_else(|err| Err(Error::internal(format!("cache computation failed: {err}"))))
        }
        .boxed()
        .shared();

        debug!(key = %full_key, flight = id, "starting computation");
        flights.insert(
            full_key.to_owned(),
            Flight {
                id,
                stale,
                result: result.clone(),
            },
        );
        result
    }

    /// Store `value` under `key`, superseding any computation in flight.
    ///
    /// # Errors
    ///
    /// Returns [`Error::internal`] when `value` cannot be serialized.
    pub async fn put<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) -> Result<(), Error> {
        let full_key = self.inner.full_key(key);
        let value = serde_json::to_value(value)
            .map_err(|err| Error::internal(format!("value not serializable: {err}")))?;
        let _gate = self.inner.write_gate.write().await;
        self.inner.cancel_flights(|candidate| candidate == full_key);
        self.inner.write(&full_key, value, ttl).await;
        Ok(())
    }

    /// Drop the entry for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::store_unavailable`] when the store cannot be reached.
    pub async fn evict(&self, key: &CacheKey) -> Result<(), Error> {
        let full_key = self.inner.full_key(key);
        let _gate = self.inner.write_gate.write().await;
        self.inner.cancel_flights(|candidate| candidate == full_key);
        self.inner.store.delete(&full_key).await?;
        Ok(())
    }

    /// Drop every entry whose relative key starts with `prefix`.
    ///
    /// Computations in flight for matching keys are detached from the
    /// sharing table and will not store their results.
    ///
    /// # Errors
    ///
    /// Returns [`Error::store_unavailable`] when the store cannot be reached.
    pub async fn invalidate(&self, prefix: &str) -> Result<usize, Error> {
        let full_prefix = format!("{}{prefix}", self.inner.namespace);
        let _gate = self.inner.write_gate.write().await;
        let cancelled = self
            .inner
            .cancel_flights(|candidate| candidate.starts_with(&full_prefix));
        let keys = self.inner.store.keys_with_prefix(&full_prefix).await?;
        let mut removed = 0;
        for key in &keys {
            if self.inner.store.delete(key).await? {
                removed += 1;
            }
        }
        debug!(prefix = %full_prefix, removed, cancelled, "cache invalidated");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    //! Hit, miss, expiry and single-flight behaviour.
    use super::*;
    use crate::domain::ErrorCode;
    use crate::domain::ports::{KeyValueStoreError, MockKeyValueStore};
    use crate::outbound::persistence::InMemoryStore;
    use crate::test_support::MutableClock;
    use chrono::TimeZone;
    use rstest::{fixture, rstest};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    const TTL: Duration = Duration::from_secs(60);

    struct Harness {
        clock: Arc<MutableClock>,
        store: Arc<InMemoryStore>,
        cache: QueryCache,
        calls: Arc<AtomicUsize>,
    }

    impl Harness {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn fetch(&self, key: &CacheKey, value: Option<u32>) -> Result<Option<u32>, Error> {
            let calls = Arc::clone(&self.calls);
            self.cache
                .get_or_compute(key, TTL, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(value)
                })
                .await
        }
    }

    #[fixture]
    fn harness() -> Harness {
        let start = Utc
            .with_ymd_and_hms(2026, 1, 1, 12, 0, 0)
            .single()
            .expect("valid timestamp");
        let clock = Arc::new(MutableClock::new(start));
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        let cache = QueryCache::new(store.clone(), clock.clone(), DEFAULT_CACHE_PREFIX)
            .expect("default namespace is valid");
        Harness {
            clock,
            store,
            cache,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn page_key(page: u32) -> CacheKey {
        let page = page.to_string();
        CacheKey::query(EntityType::BOOK, "page", &[("page", &page), ("size", "10")])
    }

    #[rstest]
    fn parameter_encoding_keeps_tuples_apart() {
        let left = CacheKey::query(EntityType::USER, "by", &[("email", "a&b=c")]);
        let right = CacheKey::query(
            EntityType::USER,
            "by",
            &[("email", "a"), ("b", "c")],
        );
        assert_ne!(left, right);
        assert!(left.as_str().starts_with(&CacheKey::queries_of(EntityType::USER)));
    }

    #[rstest]
    fn record_keys_are_outside_query_prefix() {
        let id = RecordId::new("9780134685991").expect("valid id");
        let key = CacheKey::record(EntityType::BOOK, &id);
        assert_eq!(key.as_str(), "Book:r:9780134685991");
        assert!(!key.as_str().starts_with(&CacheKey::queries_of(EntityType::BOOK)));
    }

    #[rstest]
    #[tokio::test]
    async fn computes_once_within_ttl_and_again_after_expiry(harness: Harness) {
        let key = page_key(0);
        assert_eq!(harness.fetch(&key, Some(7)).await, Ok(Some(7)));
        assert_eq!(harness.fetch(&key, Some(8)).await, Ok(Some(7)));
        assert_eq!(harness.calls(), 1);

        harness.clock.advance(TTL);
        assert_eq!(harness.fetch(&key, Some(8)).await, Ok(Some(8)));
        assert_eq!(harness.calls(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn absent_results_are_not_cached(harness: Harness) {
        let key = page_key(0);
        assert_eq!(harness.fetch(&key, None).await, Ok(None));
        assert_eq!(harness.fetch(&key, None).await, Ok(None));
        assert_eq!(harness.calls(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn errors_are_not_cached(harness: Harness) {
        let key = page_key(0);
        let err = harness
            .cache
            .get_or_compute::<u32, _, _>(&key, TTL, || async {
                Err(Error::store_unavailable("timeout"))
            })
            .await
            .expect_err("error is returned");
        assert!(err.is_retryable());
        assert_eq!(harness.fetch(&key, Some(1)).await, Ok(Some(1)));
    }

    #[rstest]
    #[tokio::test]
    async fn concurrent_callers_share_one_computation(harness: Harness) {
        let release = Arc::new(Notify::new());
        let key = page_key(1);
        let callers: Vec<_> = (0..8)
            .map(|_| {
                let cache = harness.cache.clone();
                let calls = Arc::clone(&harness.calls);
                let release = Arc::clone(&release);
                let key = key.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_compute(&key, TTL, move || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            release.notified().await;
                            Ok(Some(42_u32))
                        })
                        .await
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(50)).await;
        release.notify_one();
        for caller in futures::future::join_all(callers).await {
            assert_eq!(caller.expect("caller joins"), Ok(Some(42)));
        }
        assert_eq!(harness.calls(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn invalidation_blocks_write_back_of_inflight_result(harness: Harness) {
        let release = Arc::new(Notify::new());
        let key = page_key(0);
        let pending = tokio::spawn({
            let cache = harness.cache.clone();
            let release = Arc::clone(&release);
            let key = key.clone();
            async move {
                cache
                    .get_or_compute(&key, TTL, move || async move {
                        release.notified().await;
                        Ok(Some(1_u32))
                    })
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        harness
            .cache
            .invalidate(&CacheKey::queries_of(EntityType::BOOK))
            .await
            .expect("invalidate succeeds");
        release.notify_one();
        assert_eq!(pending.await.expect("caller joins"), Ok(Some(1)));

        assert_eq!(harness.cache.get::<u32>(&key).await, None);
        assert_eq!(harness.fetch(&key, Some(2)).await, Ok(Some(2)));
    }

    #[rstest]
    #[tokio::test]
    async fn abandoned_computation_still_fills_the_cache(harness: Harness) {
        let release = Arc::new(Notify::new());
        let key = page_key(3);
        let caller = tokio::spawn({
            let cache = harness.cache.clone();
            let release = Arc::clone(&release);
            let key = key.clone();
            async move {
                cache
                    .get_or_compute(&key, TTL, move || async move {
                        release.notified().await;
                        Ok(Some(5_u32))
                    })
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        caller.abort();
        release.notify_one();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(harness.cache.get::<u32>(&key).await, Some(5));
    }

    #[rstest]
    #[tokio::test]
    async fn invalidate_only_touches_matching_prefix(harness: Harness) {
        let book_key = page_key(0);
        let user_key = CacheKey::query(EntityType::USER, "all", &[]);
        harness.fetch(&book_key, Some(1)).await.expect("book cached");
        harness.fetch(&user_key, Some(2)).await.expect("user cached");

        let removed = harness
            .cache
            .invalidate(&CacheKey::queries_of(EntityType::BOOK))
            .await
            .expect("invalidate succeeds");

        assert_eq!(removed, 1);
        assert_eq!(harness.cache.get::<u32>(&book_key).await, None);
        assert_eq!(harness.cache.get::<u32>(&user_key).await, Some(2));
    }

    #[rstest]
    #[tokio::test]
    async fn put_and_evict_manage_point_lookups(harness: Harness) {
        let id = RecordId::new("u1").expect("valid id");
        let key = CacheKey::record(EntityType::USER, &id);
        harness.cache.put(&key, &"Ada", TTL).await.expect("put succeeds");
        assert_eq!(harness.cache.get::<String>(&key).await.as_deref(), Some("Ada"));

        harness.cache.evict(&key).await.expect("evict succeeds");
        assert_eq!(harness.cache.get::<String>(&key).await, None);
    }

    #[rstest]
    #[tokio::test]
    async fn undecodable_entry_is_a_miss(harness: Harness) {
        let key = page_key(0);
        harness
            .store
            .set("cache:Book:q:page?page=0&size=10", "{not json", None)
            .await
            .expect("raw write");
        assert_eq!(harness.fetch(&key, Some(9)).await, Ok(Some(9)));
        assert_eq!(harness.calls(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn unreachable_store_degrades_to_computing() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_get()
            .returning(|_| Err(KeyValueStoreError::unavailable("connection refused")));
        store
            .expect_set()
            .returning(|_, _, _| Err(KeyValueStoreError::unavailable("connection refused")));
        let cache = QueryCache::new(
            Arc::new(store),
            Arc::new(mockable::DefaultClock),
            DEFAULT_CACHE_PREFIX,
        )
        .expect("default namespace is valid");

        let value = cache
            .get_or_compute(&page_key(0), TTL, || async { Ok(Some(3_u32)) })
            .await;
        assert_eq!(value, Ok(Some(3)));
    }

    #[rstest]
    #[case("")]
    #[case("User:")]
    #[case("Book:cache:")]
    #[case("BookRating:")]
    fn namespaces_overlapping_record_keys_are_rejected(#[case] namespace: &str) {
        let err = QueryCache::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(mockable::DefaultClock),
            namespace,
        )
        .err()
        .expect("namespace rejected");
        assert_eq!(err.code(), ErrorCode::InvalidConfiguration);
    }

    #[rstest]
    #[case(DEFAULT_CACHE_PREFIX)]
    #[case("bookstore:cache:")]
    #[case("Users:")]
    fn namespaces_outside_record_keys_are_accepted(#[case] namespace: &str) {
        let cache = QueryCache::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(mockable::DefaultClock),
            namespace,
        );
        assert!(cache.is_ok());
    }
}
