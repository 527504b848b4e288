//! Redis-backed [`KeyValueStore`] adapter.
//!
//! Every command runs on a pooled connection under an operation timeout.
//! Timeouts, refused or dropped connections and I/O failures map to
//! [`KeyValueStoreError::Unavailable`]; anything Redis itself rejects maps to
//! [`KeyValueStoreError::Backend`]. Idempotent reads are retried once when
//! the first attempt fails transiently.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::redis::{self, Cmd, FromRedisValue, RedisError};
use tracing::{debug, warn};

use super::pool::{PoolError, RedisPool, RedisPoolConfig};
use crate::config::StoreSettings;
use crate::domain::FieldMap;
use crate::domain::ports::{KeyValueStore, KeyValueStoreError};

const SCAN_BATCH: usize = 500;

// Replies -1 when the hash is missing, else the HSET reply.
const HSET_EXISTING: &str = "if redis.call('EXISTS', KEYS[1]) == 0 then return -1 end \
return redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempts {
    Once,
    RetryOnce,
}

fn map_redis_error(err: &RedisError) -> KeyValueStoreError {
    if err.is_timeout() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
        KeyValueStoreError::unavailable(err.to_string())
    } else {
        KeyValueStoreError::backend(err.to_string())
    }
}

fn map_pool_error(err: PoolError) -> KeyValueStoreError {
    match err {
        PoolError::Unavailable { message } => KeyValueStoreError::unavailable(message),
        invalid @ PoolError::InvalidUrl { .. } => KeyValueStoreError::backend(invalid.to_string()),
    }
}

/// Escape glob metacharacters so `prefix` matches literally in `SCAN MATCH`.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Key-value store backed by a Redis connection pool.
#[derive(Clone)]
pub struct RedisStore {
    pool: RedisPool,
    operation_timeout: Duration,
}

impl RedisStore {
    /// Store issuing commands through `pool`, each bounded by
    /// `operation_timeout`.
    pub fn new(pool: RedisPool, operation_timeout: Duration) -> Self {
        Self {
            pool,
            operation_timeout,
        }
    }

    /// Build the pool and store described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidUrl`] when the Redis URL is invalid.
    pub fn from_settings(settings: &StoreSettings) -> Result<Self, PoolError> {
        let pool = RedisPool::new(RedisPoolConfig::from_settings(settings))?;
        Ok(Self::new(pool, settings.operation_timeout()))
    }

    async fn timed<T>(
        &self,
        call: impl Future<Output = Result<T, KeyValueStoreError>>,
    ) -> Result<T, KeyValueStoreError> {
        tokio::time::timeout(self.operation_timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(KeyValueStoreError::unavailable(format!(
                    "operation timed out after {:?}",
                    self.operation_timeout
                )))
            })
    }

    async fn query_once<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T, KeyValueStoreError> {
        self.timed(async {
            let mut conn = self.pool.get().await.map_err(map_pool_error)?;
            cmd.query_async(&mut *conn)
                .await
                .map_err(|err| map_redis_error(&err))
        })
        .await
    }

    async fn query<T: FromRedisValue>(
        &self,
        cmd: &Cmd,
        attempts: Attempts,
    ) -> Result<T, KeyValueStoreError> {
        match self.query_once(cmd).await {
            Err(err) if attempts == Attempts::RetryOnce && err.is_retryable() => {
                warn!(error = %err, "redis read failed; retrying once");
                self.query_once(cmd).await
            }
            result => result,
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KeyValueStoreError> {
        let value: Option<String> = self.query(redis::cmd("GET").arg(key), Attempts::RetryOnce).await?;
        Ok(value)
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), KeyValueStoreError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            cmd.arg("PX").arg(millis);
        }
        let (): () = self.query(&cmd, Attempts::Once).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, KeyValueStoreError> {
        let removed: u64 = self.query(redis::cmd("DEL").arg(key), Attempts::Once).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, KeyValueStoreError> {
        let found: bool = self.query(redis::cmd("EXISTS").arg(key), Attempts::RetryOnce).await?;
        Ok(found)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, KeyValueStoreError> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut cursor: u64 = 0;
        let mut keys = BTreeSet::new();
        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH);
            let (next, batch): (u64, Vec<String>) = self.query(&cmd, Attempts::RetryOnce).await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        debug!(%pattern, found = keys.len(), "redis prefix scan");
        Ok(keys.into_iter().collect())
    }

    async fn hash_get_all(&self, key: &str) -> Result<Option<FieldMap>, KeyValueStoreError> {
        let fields: FieldMap = self.query(redis::cmd("HGETALL").arg(key), Attempts::RetryOnce).await?;
        Ok((!fields.is_empty()).then_some(fields))
    }

    async fn hash_replace(&self, key: &str, fields: &FieldMap) -> Result<(), KeyValueStoreError> {
        let mut pipe = redis::pipe();
        pipe.atomic().cmd("DEL").arg(key).ignore();
        if !fields.is_empty() {
            let hset = pipe.cmd("HSET").arg(key);
            for (field, value) in fields {
                hset.arg(field).arg(value);
            }
            hset.ignore();
        }
        self.timed(async {
            let mut conn = self.pool.get().await.map_err(map_pool_error)?;
            let (): () = pipe
                .query_async(&mut *conn)
                .await
                .map_err(|err| map_redis_error(&err))?;
            Ok(())
        })
        .await
    }

    async fn hash_set_existing_field(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<bool>, KeyValueStoreError> {
        let mut cmd = redis::cmd("EVAL");
        cmd.arg(HSET_EXISTING).arg(1).arg(key).arg(field).arg(value);
        let reply: i64 = self.query(&cmd, Attempts::Once).await?;
        Ok((reply >= 0).then_some(reply > 0))
    }

    async fn hash_delete_field(&self, key: &str, field: &str) -> Result<bool, KeyValueStoreError> {
        let removed: u64 = self
            .query(redis::cmd("HDEL").arg(key).arg(field), Attempts::Once)
            .await?;
        Ok(removed > 0)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, KeyValueStoreError> {
        let added: u64 = self
            .query(redis::cmd("SADD").arg(key).arg(member), Attempts::Once)
            .await?;
        Ok(added > 0)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, KeyValueStoreError> {
        let removed: u64 = self
            .query(redis::cmd("SREM").arg(key).arg(member), Attempts::Once)
            .await?;
        Ok(removed > 0)
    }

    async fn set_move(
        &self,
        source: &str,
        destination: &str,
        member: &str,
    ) -> Result<bool, KeyValueStoreError> {
        let moved: bool = self
            .query(
                redis::cmd("SMOVE").arg(source).arg(destination).arg(member),
                Attempts::Once,
            )
            .await?;
        Ok(moved)
    }

    async fn set_members(&self, key: &str) -> Result<BTreeSet<String>, KeyValueStoreError> {
        let members: BTreeSet<String> = self
            .query(redis::cmd("SMEMBERS").arg(key), Attempts::RetryOnce)
            .await?;
        Ok(members)
    }

    async fn set_len(&self, key: &str) -> Result<usize, KeyValueStoreError> {
        let len: usize = self.query(redis::cmd("SCARD").arg(key), Attempts::RetryOnce).await?;
        Ok(len)
    }
}
