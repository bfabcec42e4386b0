//! Injectable clock abstraction.
//!
//! All time-based transitions in `dq-queue` and `dq-lock` (stuck in-progress
//! rescue, failed-before cutoffs, lock expiry) go through a `Clock` rather than
//! calling `Utc::now()` directly, so that tests can drive the clock deterministically.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// A source of the current wall-clock time, millisecond granularity.
///
/// No monotonic guarantee across processes is required; callers tolerate bounded
/// clock skew (see the lock repository's documented limitations).
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock for tests. Cheap to `Clone`; clones share the same
/// underlying instant so advancing one is visible to all.
#[derive(Debug, Clone)]
pub struct TestClock {
    inner: Arc<Mutex<DateTime<Utc>>>,
}

impl TestClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.inner.lock().expect("clock mutex poisoned") = instant;
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.inner.lock().expect("clock mutex poisoned");
        *guard += delta;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.inner.lock().expect("clock mutex poisoned")
    }
}
