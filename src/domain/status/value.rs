//! Timestamped status slot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A status value observed at a point in time. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusValue<T> {
    timestamp: DateTime<Utc>,
    value: T,
}

impl<T> StatusValue<T> {
    pub fn new(value: T, timestamp: impl Into<DateTime<Utc>>) -> Self {
        Self {
            timestamp: timestamp.into(),
            value,
        }
    }

    pub fn now(value: T) -> Self {
        Self::new(value, Utc::now())
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T: std::fmt::Display> std::fmt::Display for StatusValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} since {}", self.value, self.timestamp.to_rfc3339())
    }
}
