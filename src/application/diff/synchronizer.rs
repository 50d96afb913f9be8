//! Incremental status synchronization with one roaming partner
//!
//! Keeps the snapshot last transmitted to the partner. A cycle builds a
//! [`StatusDiff`] either from a fresh full snapshot or from the live
//! updates recorded since the last commit; once the transport has
//! delivered it, [`StatusSynchronizer::commit`] adopts the new state.
//! Live updates stay pending until a commit covers them, so a failed
//! delivery is simply flushed again.

use std::collections::BTreeMap;
use std::fmt::Display;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::status_diff::StatusDiff;

#[derive(Debug, Clone)]
pub struct StatusSynchronizer<Id: Ord, T> {
    owner_id: String,
    owner_label: String,
    transmitted: BTreeMap<Id, T>,
    /// `None` marks a removal
    pending: BTreeMap<Id, Option<T>>,
}

impl<Id, T> StatusSynchronizer<Id, T>
where
    Id: Ord + Clone + Display,
    T: Clone + PartialEq + Display,
{
    pub fn new(owner_id: impl Into<String>, owner_label: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            owner_label: owner_label.into(),
            transmitted: BTreeMap::new(),
            pending: BTreeMap::new(),
        }
    }

    /// State the partner is known to have
    pub fn transmitted(&self) -> &BTreeMap<Id, T> {
        &self.transmitted
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Full walk: diff between the transmitted state and `snapshot`
    pub fn diff_snapshot(
        &self,
        snapshot: &BTreeMap<Id, T>,
        timestamp: impl Into<DateTime<Utc>>,
    ) -> StatusDiff<Id, T> {
        StatusDiff::between(
            self.owner_id.clone(),
            self.owner_label.clone(),
            timestamp,
            &self.transmitted,
            snapshot,
        )
    }

    /// Later updates for the same id replace earlier ones.
    pub fn record_update(&mut self, id: Id, status: T) {
        self.pending.insert(id, Some(status));
    }

    pub fn record_removal(&mut self, id: Id) {
        self.pending.insert(id, None);
    }

    /// Live mode: diff of everything recorded and not yet committed.
    /// Updates equal to the transmitted state are dropped.
    pub fn flush(&self, timestamp: impl Into<DateTime<Utc>>) -> StatusDiff<Id, T> {
        let mut diff = StatusDiff::new(self.owner_id.clone(), self.owner_label.clone(), timestamp);

        for (id, update) in &self.pending {
            match (self.transmitted.get(id), update) {
                (None, Some(status)) => {
                    diff.add_new(id.clone(), status.clone());
                }
                (Some(old), Some(status)) if old != status => {
                    diff.add_changed(id.clone(), status.clone());
                }
                (Some(_), None) => {
                    diff.add_removed(id.clone());
                }
                _ => {}
            }
        }

        debug!(owner = %self.owner_id, diff = %diff.short_info(), "Status updates flushed");
        diff
    }

    /// Adopts `diff` as delivered. Pending updates it covers, and any
    /// that now match the transmitted state, are dropped.
    pub fn commit(&mut self, diff: &StatusDiff<Id, T>) {
        for (id, status) in diff.new_entries().iter().chain(diff.changed_entries()) {
            self.transmitted.insert(id.clone(), status.clone());
        }
        for id in diff.removed_ids() {
            self.transmitted.remove(id);
        }

        let transmitted = &self.transmitted;
        self.pending.retain(|id, update| match update {
            Some(status) => transmitted.get(id) != Some(status),
            None => transmitted.contains_key(id),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::ResourceId;
    use crate::domain::status::AvailabilityStatus::{self, *};

    fn id(s: &str) -> ResourceId {
        ResourceId::from(s)
    }

    fn sync() -> StatusSynchronizer<ResourceId, AvailabilityStatus> {
        StatusSynchronizer::new("DE*GEF", "GraphDefined")
    }

    #[test]
    fn snapshot_cycle_sends_only_differences() {
        let mut s = sync();
        let first = BTreeMap::from([(id("E1"), Available), (id("E2"), Available)]);

        let diff = s.diff_snapshot(&first, Utc::now());
        assert_eq!(diff.short_info(), "2/0/0");
        s.commit(&diff);

        let second = BTreeMap::from([(id("E1"), Charging), (id("E3"), Available)]);
        let diff = s.diff_snapshot(&second, Utc::now());
        assert_eq!(diff.short_info(), "1/1/1");
        s.commit(&diff);

        assert_eq!(s.transmitted(), &second);
        assert!(s.diff_snapshot(&second, Utc::now()).is_empty());
    }

    #[test]
    fn live_updates_collapse_per_id() {
        let mut s = sync();
        s.record_update(id("E1"), Available);
        s.record_update(id("E1"), Charging);
        s.record_update(id("E2"), Available);
        assert_eq!(s.pending_len(), 2);

        let diff = s.flush(Utc::now());
        assert_eq!(diff.new_entries().get(&id("E1")), Some(&Charging));
        assert_eq!(diff.short_info(), "2/0/0");
        s.commit(&diff);
        assert_eq!(s.pending_len(), 0);

        s.record_update(id("E1"), Charging);
        s.record_update(id("E2"), Error);
        s.record_removal(id("E3"));
        s.record_removal(id("E1"));
        let diff = s.flush(Utc::now());
        // E1 removed, E2 changed, E3 was never transmitted
        assert_eq!(diff.short_info(), "0/1/1");
    }

    #[test]
    fn unchanged_updates_are_dropped() {
        let mut s = sync();
        s.record_update(id("E1"), Available);
        let diff = s.flush(Utc::now());
        s.commit(&diff);

        s.record_update(id("E1"), Available);
        assert!(s.flush(Utc::now()).is_empty());
    }

    #[test]
    fn undelivered_updates_are_flushed_again() {
        let mut s = sync();
        s.record_update(id("E1"), Charging);

        let first = s.flush(Utc::now());
        assert_eq!(first.short_info(), "1/0/0");
        // transport failed: no commit
        let retry = s.flush(Utc::now());
        assert_eq!(retry.short_info(), "1/0/0");
        assert_eq!(retry.new_entries().get(&id("E1")), Some(&Charging));

        s.commit(&retry);
        assert!(s.flush(Utc::now()).is_empty());
        assert_eq!(s.pending_len(), 0);
    }

    #[test]
    fn updates_recorded_after_flush_survive_commit() {
        let mut s = sync();
        s.record_update(id("E1"), Available);
        let diff = s.flush(Utc::now());

        s.record_update(id("E1"), Charging);
        s.commit(&diff);

        let next = s.flush(Utc::now());
        assert_eq!(next.changed_entries().get(&id("E1")), Some(&Charging));
    }
}
