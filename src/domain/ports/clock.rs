//! Time source

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::shared::lock;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: impl Into<DateTime<Utc>>) -> Self {
        Self {
            now: Mutex::new(now.into()),
        }
    }

    pub fn set(&self, now: impl Into<DateTime<Utc>>) {
        *lock(&self.now) = now.into();
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}
