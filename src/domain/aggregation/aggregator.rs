//! Rolls child statuses up into a parent status

use std::any::Any;
use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::policy::{AggregationPolicy, MajorityPolicy, StatusCounts, TieBreak};
use crate::domain::error::AggregationError;
use crate::domain::status::{StatusChange, StatusSchedule, StatusUpdate};

/// Outcome of one aggregation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationOutcome<T> {
    /// Aggregate equals the current status; nothing written
    Unchanged,
    /// Aggregate written to the parent schedule
    Changed(StatusChange<T>),
    /// Policy failed or panicked; parent keeps its previous status
    Skipped(AggregationError),
}

impl<T> AggregationOutcome<T> {
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed(_))
    }
}

/// Applies an aggregation policy to child statuses.
///
/// Policy errors and panics are contained: the pass is skipped.
pub struct StatusAggregator<T> {
    policy: Arc<dyn AggregationPolicy<T>>,
}

impl<T> Clone for StatusAggregator<T> {
    fn clone(&self) -> Self {
        Self {
            policy: Arc::clone(&self.policy),
        }
    }
}

impl<T> Debug for StatusAggregator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusAggregator").finish_non_exhaustive()
    }
}

impl<T> StatusAggregator<T>
where
    T: Ord + Clone + Debug + Send + Sync + 'static,
{
    pub fn new(policy: Arc<dyn AggregationPolicy<T>>) -> Self {
        Self { policy }
    }

    /// Majority vote with the given tie-break
    pub fn majority(tie_break: TieBreak<T>) -> Self {
        Self::new(Arc::new(MajorityPolicy::new(tie_break)))
    }

    pub fn count(statuses: impl IntoIterator<Item = T>) -> StatusCounts<T> {
        let mut counts = StatusCounts::new();
        for status in statuses {
            *counts.entry(status).or_insert(0) += 1;
        }
        counts
    }

    pub fn aggregate(&self, statuses: impl IntoIterator<Item = T>) -> Result<T, AggregationError> {
        let counts = Self::count(statuses);
        match panic::catch_unwind(AssertUnwindSafe(|| self.policy.aggregate(&counts))) {
            Ok(result) => result,
            Err(payload) => Err(AggregationError::Policy(panic_message(payload.as_ref()))),
        }
    }

    /// Aggregates `statuses` and writes the result into `schedule` if it
    /// differs from the current value. Repeating a pass with the same
    /// inputs is a no-op.
    pub fn apply(
        &self,
        schedule: &mut StatusSchedule<T>,
        statuses: impl IntoIterator<Item = T>,
        timestamp: DateTime<Utc>,
    ) -> AggregationOutcome<T> {
        let aggregate = match self.aggregate(statuses) {
            Ok(value) => value,
            Err(e) => return AggregationOutcome::Skipped(e),
        };

        if aggregate == *schedule.current_value() {
            return AggregationOutcome::Unchanged;
        }

        let timestamp = if schedule.has_reported() {
            timestamp.max(schedule.current().timestamp())
        } else {
            timestamp
        };
        match schedule.set_status(aggregate, timestamp) {
            StatusUpdate::Changed(change) => AggregationOutcome::Changed(change),
            _ => AggregationOutcome::Unchanged,
        }
    }
}

impl<T> Default for StatusAggregator<T>
where
    T: Ord + Clone + Debug + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::majority(TieBreak::Ordinal)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "policy panicked".to_string()
    }
}
