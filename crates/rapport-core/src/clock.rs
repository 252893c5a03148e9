//! Authoritative time source for session actors.
//!
//! Session math (durations, cooldowns, auto-dismiss) reads time only through
//! [`Clock`], so tests can drive it with [`ManualClock`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Source of wall-clock timestamps.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Clone, Debug)]
pub struct ManualClock {
    inner: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(start)),
        }
    }

    /// Move forward by whole seconds.
    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }

    /// Move forward by an arbitrary duration.
    pub fn advance(&self, by: Duration) {
        let mut now = self.inner.lock();
        *now += by;
    }

    /// Jump to an absolute time.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.inner.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.inner.lock()
    }
}

/// Seconds as `f64` for a (possibly negative) chrono duration.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn duration_secs(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let start = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = ManualClock::new(start);
        clock.advance_secs(10);
        assert_eq!(clock.now(), start + Duration::seconds(10));
    }

    #[test]
    fn clones_share_time() {
        let clock = ManualClock::new(Utc::now());
        let other = clock.clone();
        clock.advance_secs(5);
        assert_eq!(clock.now(), other.now());
    }

    #[test]
    fn system_clock_moves_forward() {
        let a = SystemClock.now();
        let b = SystemClock.now();
        assert!(b >= a);
    }

    #[test]
    fn duration_secs_handles_fractions() {
        assert!((duration_secs(Duration::milliseconds(1500)) - 1.5).abs() < f64::EPSILON);
        assert!((duration_secs(Duration::seconds(-2)) + 2.0).abs() < f64::EPSILON);
    }
}
