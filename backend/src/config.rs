//! Store configuration loaded via OrthoConfig.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::domain::{DEFAULT_CACHE_PREFIX, DEFAULT_CACHE_TTL};

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_POOL_MAX_SIZE: u32 = 10;
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 2_000;

/// Connection, timeout and cache settings for the record store.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "BOOKSTORE_STORE")]
pub struct StoreSettings {
    /// Redis connection URL.
    pub redis_url: Option<String>,
    /// Maximum pooled Redis connections.
    pub pool_max_size: Option<u32>,
    /// Upper bound for a single store operation, in milliseconds.
    pub operation_timeout_ms: Option<u64>,
    /// Lifetime of cached query results, in seconds.
    pub cache_ttl_secs: Option<u64>,
    /// Namespace prepended to every cache key. Must be non-empty and must
    /// not start with an entity name followed by `:`.
    pub cache_prefix: Option<String>,
}

impl StoreSettings {
    /// Return the configured Redis URL, falling back to the local default.
    pub fn redis_url(&self) -> &str {
        self.redis_url.as_deref().unwrap_or(DEFAULT_REDIS_URL)
    }

    /// Return the configured pool size, falling back to the default.
    pub fn pool_max_size(&self) -> u32 {
        self.pool_max_size.unwrap_or(DEFAULT_POOL_MAX_SIZE).max(1)
    }

    /// Return the per-operation timeout.
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(
            self.operation_timeout_ms
                .unwrap_or(DEFAULT_OPERATION_TIMEOUT_MS),
        )
    }

    /// Return the cache entry lifetime.
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl_secs
            .map_or(DEFAULT_CACHE_TTL, Duration::from_secs)
    }

    /// Return the cache key namespace.
    pub fn cache_prefix(&self) -> &str {
        self.cache_prefix.as_deref().unwrap_or(DEFAULT_CACHE_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for store configuration parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const VARS: [&str; 5] = [
        "BOOKSTORE_STORE_REDIS_URL",
        "BOOKSTORE_STORE_POOL_MAX_SIZE",
        "BOOKSTORE_STORE_OPERATION_TIMEOUT_MS",
        "BOOKSTORE_STORE_CACHE_TTL_SECS",
        "BOOKSTORE_STORE_CACHE_PREFIX",
    ];

    fn load_from_empty_args() -> StoreSettings {
        StoreSettings::load_from_iter([OsString::from("bookstore")]).expect("config should load")
    }

    #[rstest]
    fn default_values_are_used_when_missing() {
        let _guard = lock_env(VARS.map(|name| (name, None::<String>)));

        let settings = load_from_empty_args();
        assert_eq!(settings.redis_url(), DEFAULT_REDIS_URL);
        assert_eq!(settings.pool_max_size(), DEFAULT_POOL_MAX_SIZE);
        assert_eq!(settings.operation_timeout(), Duration::from_secs(2));
        assert_eq!(settings.cache_ttl(), Duration::from_secs(3_600));
        assert_eq!(settings.cache_prefix(), "cache:");
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env([
            ("BOOKSTORE_STORE_REDIS_URL", Some("redis://cache.internal:6380".to_owned())),
            ("BOOKSTORE_STORE_POOL_MAX_SIZE", Some("32".to_owned())),
            ("BOOKSTORE_STORE_OPERATION_TIMEOUT_MS", Some("250".to_owned())),
            ("BOOKSTORE_STORE_CACHE_TTL_SECS", Some("60".to_owned())),
            ("BOOKSTORE_STORE_CACHE_PREFIX", Some("bookstore:cache:".to_owned())),
        ]);

        let settings = load_from_empty_args();
        assert_eq!(settings.redis_url(), "redis://cache.internal:6380");
        assert_eq!(settings.pool_max_size(), 32);
        assert_eq!(settings.operation_timeout(), Duration::from_millis(250));
        assert_eq!(settings.cache_ttl(), Duration::from_secs(60));
        assert_eq!(settings.cache_prefix(), "bookstore:cache:");
    }
}
