//! Wall-clock abstraction.
//!
//! Entry validity is computed against `Clock::now()` so that TTL and
//! max-age behaviour can be exercised without sleeping.

use crate::Timestamp;
use chrono::Utc;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Source of the current time.
pub trait Clock: Send + Sync + 'static {
    /// Current UTC timestamp.
    fn now(&self) -> Timestamp;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Manually advanced clock for tests and simulations.
///
/// Clones share the same underlying instant, so a clone handed to a cache
/// can be advanced from the test body.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<Timestamp>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Create a clock frozen at the current system time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        if let Ok(mut now) = self.now.write() {
            *now = now.checked_add_signed(delta).unwrap_or(*now);
        }
    }

    /// Jump to an absolute timestamp.
    pub fn set(&self, to: Timestamp) {
        if let Ok(mut now) = self.now.write() {
            *now = to;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.read().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}
