//! Bounded, newest-first status history with change observers

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::value::StatusValue;

/// Bounds applied to a schedule's history. The head is never trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimits {
    /// Maximum number of entries kept (at least 1)
    pub max_len: usize,
    /// Entries older than `head - max_age` are dropped
    pub max_age: Option<Duration>,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            max_len: 50,
            max_age: None,
        }
    }
}

/// Payload delivered to observers when the current value changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange<T> {
    pub old: T,
    pub new: T,
    pub timestamp: DateTime<Utc>,
}

/// Result of writing to a schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate<T> {
    /// New value accepted and observers notified
    Changed(StatusChange<T>),
    /// Same value; head timestamp moved forward
    Refreshed,
    /// Same value recorded as a new history entry
    Recorded,
    /// Timestamp older than the current head; ignored
    Stale,
}

impl<T> StatusUpdate<T> {
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed(_))
    }

    pub fn change(&self) -> Option<&StatusChange<T>> {
        match self {
            Self::Changed(change) => Some(change),
            _ => None,
        }
    }
}

/// Receives status changes synchronously, in registration order.
///
/// Observers run while the owning resource is locked and must not write
/// back into the same resource.
pub trait StatusObserver<T>: Send + Sync {
    fn on_status_changed(&self, change: &StatusChange<T>);
}

impl<T, F> StatusObserver<T> for F
where
    F: Fn(&StatusChange<T>) + Send + Sync,
{
    fn on_status_changed(&self, change: &StatusChange<T>) {
        self(change)
    }
}

/// Ordered status history, newest first. Never empty: the head is the
/// current status.
pub struct StatusSchedule<T> {
    entries: VecDeque<StatusValue<T>>,
    limits: HistoryLimits,
    observers: Vec<Arc<dyn StatusObserver<T>>>,
    /// Head is a default seeded at creation, not a reported value
    placeholder: bool,
}

impl<T: Clone + PartialEq> StatusSchedule<T> {
    pub fn new(initial: T, timestamp: impl Into<DateTime<Utc>>, limits: HistoryLimits) -> Self {
        let mut entries = VecDeque::with_capacity(limits.max_len.clamp(1, 64));
        entries.push_front(StatusValue::new(initial, timestamp));
        Self {
            entries,
            limits,
            observers: Vec::new(),
            placeholder: false,
        }
    }

    /// Starts from a default value that no one reported. The first write
    /// is accepted whatever its timestamp.
    pub fn placeholder(initial: T, timestamp: impl Into<DateTime<Utc>>, limits: HistoryLimits) -> Self {
        Self {
            placeholder: true,
            ..Self::new(initial, timestamp, limits)
        }
    }

    /// False until the first write lands on a placeholder schedule
    pub fn has_reported(&self) -> bool {
        !self.placeholder
    }

    pub fn current(&self) -> &StatusValue<T> {
        &self.entries[0]
    }

    pub fn current_value(&self) -> &T {
        self.entries[0].value()
    }

    /// Newest-first history. Can be iterated any number of times.
    pub fn history(&self) -> impl Iterator<Item = &StatusValue<T>> + Clone + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limits(&self) -> HistoryLimits {
        self.limits
    }

    pub fn subscribe(&mut self, observer: Arc<dyn StatusObserver<T>>) {
        self.observers.push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Records `value` only if it differs from the current one; an equal
    /// value just moves the head timestamp forward.
    pub fn set_status(
        &mut self,
        value: T,
        timestamp: impl Into<DateTime<Utc>>,
    ) -> StatusUpdate<T> {
        let timestamp = timestamp.into();
        if !self.accepts(timestamp) {
            return StatusUpdate::Stale;
        }

        if value == *self.current_value() {
            self.entries[0] = StatusValue::new(value, timestamp);
            return StatusUpdate::Refreshed;
        }

        self.push(value, timestamp)
    }

    /// Records `value` as a new history entry even when unchanged
    /// (keep-alive). Observers still only hear about real changes.
    pub fn record_status(
        &mut self,
        value: T,
        timestamp: impl Into<DateTime<Utc>>,
    ) -> StatusUpdate<T> {
        let timestamp = timestamp.into();
        if !self.accepts(timestamp) {
            return StatusUpdate::Stale;
        }

        if value == *self.current_value() {
            self.entries.push_front(StatusValue::new(value, timestamp));
            self.trim();
            return StatusUpdate::Recorded;
        }

        self.push(value, timestamp)
    }

    /// Rejects timestamps older than the head. A placeholder head takes
    /// any timestamp and is moved back to it, keeping history ordered.
    fn accepts(&mut self, timestamp: DateTime<Utc>) -> bool {
        if self.placeholder {
            self.placeholder = false;
            if timestamp < self.current().timestamp() {
                let initial = self.current_value().clone();
                self.entries[0] = StatusValue::new(initial, timestamp);
            }
            return true;
        }
        timestamp >= self.current().timestamp()
    }

    fn push(&mut self, value: T, timestamp: DateTime<Utc>) -> StatusUpdate<T> {
        let old = self.current_value().clone();
        self.entries
            .push_front(StatusValue::new(value.clone(), timestamp));
        self.trim();

        let change = StatusChange {
            old,
            new: value,
            timestamp,
        };
        for observer in &self.observers {
            observer.on_status_changed(&change);
        }
        StatusUpdate::Changed(change)
    }

    fn trim(&mut self) {
        self.entries.truncate(self.limits.max_len.max(1));

        let cutoff = self
            .limits
            .max_age
            .and_then(|max_age| self.current().timestamp().checked_sub_signed(max_age));
        if let Some(cutoff) = cutoff {
            while self.entries.len() > 1
                && self
                    .entries
                    .back()
                    .is_some_and(|entry| entry.timestamp() < cutoff)
            {
                self.entries.pop_back();
            }
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for StatusSchedule<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusSchedule")
            .field("entries", &self.entries)
            .field("limits", &self.limits)
            .field("observers", &self.observers.len())
            .field("placeholder", &self.placeholder)
            .finish()
    }
}
