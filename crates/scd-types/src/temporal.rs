use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, SubsecRound, Utc};

use crate::error::TypeError;

/// Wall-clock timestamp used for validity intervals.
///
/// Every [`Clock`] truncates to microseconds so that timestamps round-trip
/// exactly through backends that persist integer microseconds.
pub type Timestamp = DateTime<Utc>;

/// Truncate a timestamp to microsecond precision.
pub fn truncate(t: Timestamp) -> Timestamp {
    t.trunc_subsecs(6)
}

/// Microseconds since the UNIX epoch.
pub fn to_micros(t: &Timestamp) -> i64 {
    t.timestamp_micros()
}

/// Inverse of [`to_micros`].
pub fn from_micros(micros: i64) -> Result<Timestamp, TypeError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| TypeError::InvalidTimestamp(format!("{micros} micros out of range")))
}

/// Source of "now" for the versioning protocols.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// The system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        truncate(Utc::now())
    }
}

/// A deterministic clock that advances by a fixed step on every read.
///
/// Used by tests that need strictly increasing, predictable timestamps.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<Timestamp>,
    step: chrono::Duration,
}

impl ManualClock {
    pub fn new(start: Timestamp, step: chrono::Duration) -> Self {
        Self {
            current: Mutex::new(truncate(start)),
            step,
        }
    }

    /// Starts at `start` and advances one second per read.
    pub fn starting_at(start: Timestamp) -> Self {
        Self::new(start, chrono::Duration::seconds(1))
    }

    /// The value the next call to `now()` will return.
    pub fn peek(&self) -> Timestamp {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the clock to an explicit instant.
    pub fn set(&self, t: Timestamp) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = truncate(t);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let now = *current;
        *current = now + self.step;
        now
    }
}
