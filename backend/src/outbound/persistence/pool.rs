//! `bb8-redis` pool behind the Redis store adapter.
//!
//! The pool opens connections lazily, so building it never touches the
//! network. Unreachable servers surface on checkout as
//! [`PoolError::Unavailable`].

use std::time::Duration;

use bb8_redis::RedisConnectionManager;
use bb8_redis::bb8::{Pool, PooledConnection};
use url::Url;

use crate::config::StoreSettings;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(2);

/// Failures building the pool or checking a connection out of it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The Redis URL was rejected; credentials are redacted from `url`.
    #[error("invalid redis url {url}: {message}")]
    InvalidUrl {
        /// Redacted URL.
        url: String,
        /// Parser message.
        message: String,
    },
    /// No connection became available within the checkout timeout.
    #[error("redis connection unavailable: {message}")]
    Unavailable {
        /// Underlying failure.
        message: String,
    },
}

impl PoolError {
    /// Rejected `url`, with any password replaced before it is kept.
    pub fn invalid_url(url: &str, message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: redact(url),
            message: message.into(),
        }
    }

    /// Checkout failure.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

fn redact(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            // Only fails for URLs that cannot carry credentials at all.
            if url.set_password(Some("***")).is_err() {
                return "<redacted>".to_owned();
            }
            url.into()
        }
        Ok(url) => url.into(),
        Err(_) => "<unparseable>".to_owned(),
    }
}

/// Where and how the pool connects.
///
/// ```
/// use std::time::Duration;
/// use bookstore::outbound::persistence::RedisPoolConfig;
///
/// let config = RedisPoolConfig::new("redis://127.0.0.1:6379")
///     .with_max_size(4)
///     .with_connection_timeout(Duration::from_millis(500));
/// assert_eq!(config.max_size(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisPoolConfig {
    redis_url: String,
    max_size: u32,
    min_idle: Option<u32>,
    connection_timeout: Duration,
}

impl RedisPoolConfig {
    /// Ten connections, none kept idle, two second checkout timeout.
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            max_size: DEFAULT_MAX_CONNECTIONS,
            min_idle: None,
            connection_timeout: DEFAULT_CHECKOUT_TIMEOUT,
        }
    }

    /// Pool sized by `settings`, whose operation timeout also bounds
    /// checkout.
    pub fn from_settings(settings: &StoreSettings) -> Self {
        Self::new(settings.redis_url())
            .with_max_size(settings.pool_max_size())
            .with_connection_timeout(settings.operation_timeout())
    }

    /// Cap on open connections; zero is raised to one.
    pub fn with_max_size(self, max_size: u32) -> Self {
        Self {
            max_size: max_size.max(1),
            ..self
        }
    }

    /// Connections kept open while idle.
    pub fn with_min_idle(self, min_idle: Option<u32>) -> Self {
        Self { min_idle, ..self }
    }

    /// How long checkout waits for a free connection.
    pub fn with_connection_timeout(self, connection_timeout: Duration) -> Self {
        Self {
            connection_timeout,
            ..self
        }
    }

    /// Target Redis URL.
    pub fn redis_url(&self) -> &str {
        &self.redis_url
    }

    /// Cap on open connections.
    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    /// Checkout timeout.
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }
}

/// Shared handle to pooled Redis connections.
#[derive(Clone)]
pub struct RedisPool {
    inner: Pool<RedisConnectionManager>,
}

impl RedisPool {
    /// Build a pool for `config`. Must run inside a Tokio runtime, which
    /// hosts the pool's reaper task.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidUrl`] when the URL cannot be parsed.
    pub fn new(config: RedisPoolConfig) -> Result<Self, PoolError> {
        let manager = RedisConnectionManager::new(config.redis_url.as_str())
            .map_err(|err| PoolError::invalid_url(&config.redis_url, err.to_string()))?;
        let inner = Pool::builder()
            .max_size(config.max_size)
            .min_idle(config.min_idle)
            .connection_timeout(config.connection_timeout)
            .build_unchecked(manager);
        Ok(Self { inner })
    }

    /// Check out a connection.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Unavailable`] when the server cannot be reached
    /// or every connection stays busy past the checkout timeout.
    pub async fn get(&self) -> Result<PooledConnection<'_, RedisConnectionManager>, PoolError> {
        self.inner
            .get()
            .await
            .map_err(|err| PoolError::unavailable(err.to_string()))
    }
}
