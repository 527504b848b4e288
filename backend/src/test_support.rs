//! Test utilities for the bookstore crate.
//!
//! Shared by unit tests (in `src/`) and integration tests (in `tests/`),
//! which enable the `test-support` feature.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use mockable::Clock;

use crate::domain::ports::{PasswordEncoder, PasswordEncoderError};

/// Manually driven clock: reads the start instant plus every advance so far.
///
/// Advances are lock-free, so the clock can be shared with spawned tasks.
pub struct MutableClock {
    start: DateTime<Utc>,
    elapsed_micros: AtomicU64,
}

impl MutableClock {
    /// Clock reading `start` until advanced.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            elapsed_micros: AtomicU64::new(0),
        }
    }

    /// Clock starting at midnight UTC on 2026-01-01.
    pub fn at_fixed_instant() -> Self {
        Self::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().unwrap_or_default())
    }

    /// Move the clock forward; sub-microsecond parts are dropped.
    pub fn advance(&self, by: Duration) {
        let micros = u64::try_from(by.as_micros()).unwrap_or(u64::MAX);
        self.elapsed_micros.fetch_add(micros, Ordering::SeqCst);
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        let elapsed = self.elapsed_micros.load(Ordering::SeqCst);
        i64::try_from(elapsed)
            .ok()
            .and_then(|micros| self.start.checked_add_signed(TimeDelta::microseconds(micros)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Password encoder that tags the raw password instead of hashing it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextEncoder;

impl PlainTextEncoder {
    /// Encoded form produced for `raw`.
    pub fn encoded(raw: &str) -> String {
        format!("{{noop}}{raw}")
    }
}

impl PasswordEncoder for PlainTextEncoder {
    fn encode(&self, raw: &str) -> Result<String, PasswordEncoderError> {
        Ok(Self::encoded(raw))
    }
}
