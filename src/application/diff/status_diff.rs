//! Status diff: additions, changes and removals between two snapshots

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Write as _};

use chrono::{DateTime, Utc};

use super::report::StatusReport;

/// One synchronization cycle's worth of status changes for a roaming
/// partner. Append-only; an id may appear in at most one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusDiff<Id: Ord, T> {
    timestamp: DateTime<Utc>,
    owner_id: String,
    owner_label: String,
    new_entries: BTreeMap<Id, T>,
    changed_entries: BTreeMap<Id, T>,
    removed_ids: BTreeSet<Id>,
}

impl<Id, T> StatusDiff<Id, T>
where
    Id: Ord + Clone + Display,
    T: Clone + Display,
{
    pub fn new(
        owner_id: impl Into<String>,
        owner_label: impl Into<String>,
        timestamp: impl Into<DateTime<Utc>>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            owner_id: owner_id.into(),
            owner_label: owner_label.into(),
            new_entries: BTreeMap::new(),
            changed_entries: BTreeMap::new(),
            removed_ids: BTreeSet::new(),
        }
    }

    /// Diff that turns `previous` into `current`
    pub fn between(
        owner_id: impl Into<String>,
        owner_label: impl Into<String>,
        timestamp: impl Into<DateTime<Utc>>,
        previous: &BTreeMap<Id, T>,
        current: &BTreeMap<Id, T>,
    ) -> Self
    where
        T: PartialEq,
    {
        let mut diff = Self::new(owner_id, owner_label, timestamp);
        for (id, status) in current {
            match previous.get(id) {
                None => {
                    diff.add_new(id.clone(), status.clone());
                }
                Some(old) if old != status => {
                    diff.add_changed(id.clone(), status.clone());
                }
                Some(_) => {}
            }
        }
        diff.add_removed_many(previous.keys().filter(|id| !current.contains_key(*id)).cloned());
        diff
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn owner_label(&self) -> &str {
        &self.owner_label
    }

    pub fn new_entries(&self) -> &BTreeMap<Id, T> {
        &self.new_entries
    }

    pub fn changed_entries(&self) -> &BTreeMap<Id, T> {
        &self.changed_entries
    }

    pub fn removed_ids(&self) -> &BTreeSet<Id> {
        &self.removed_ids
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.new_entries.contains_key(id)
            || self.changed_entries.contains_key(id)
            || self.removed_ids.contains(id)
    }

    /// Total entries over all three buckets
    pub fn len(&self) -> usize {
        self.new_entries.len() + self.changed_entries.len() + self.removed_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// # Panics
    /// If `id` is already in this diff.
    pub fn add_new(&mut self, id: Id, status: T) -> &mut Self {
        self.assert_absent(&id);
        self.new_entries.insert(id, status);
        self
    }

    /// # Panics
    /// If `id` is already in this diff.
    pub fn add_changed(&mut self, id: Id, status: T) -> &mut Self {
        self.assert_absent(&id);
        self.changed_entries.insert(id, status);
        self
    }

    /// # Panics
    /// If `id` is already in this diff.
    pub fn add_removed(&mut self, id: Id) -> &mut Self {
        self.assert_absent(&id);
        self.removed_ids.insert(id);
        self
    }

    pub fn add_new_many(&mut self, entries: impl IntoIterator<Item = (Id, T)>) -> &mut Self {
        for (id, status) in entries {
            self.add_new(id, status);
        }
        self
    }

    pub fn add_changed_many(&mut self, entries: impl IntoIterator<Item = (Id, T)>) -> &mut Self {
        for (id, status) in entries {
            self.add_changed(id, status);
        }
        self
    }

    pub fn add_removed_many(&mut self, ids: impl IntoIterator<Item = Id>) -> &mut Self {
        for id in ids {
            self.add_removed(id);
        }
        self
    }

    fn assert_absent(&self, id: &Id) {
        assert!(
            !self.contains(id),
            "status diff {}: id {} added twice in one cycle",
            self.owner_id,
            id
        );
    }

    /// `"<new>/<changed>/<removed>"`
    pub fn short_info(&self) -> String {
        format!(
            "{}/{}/{}",
            self.new_entries.len(),
            self.changed_entries.len(),
            self.removed_ids.len()
        )
    }

    /// Every entry, one per line, grouped by bucket
    pub fn extended_info(&self) -> String {
        let mut out = format!(
            "{} ({}) status diff at {}: {}\n",
            self.owner_label,
            self.owner_id,
            self.timestamp.to_rfc3339(),
            self.short_info()
        );

        let _ = writeln!(out, "new: {}", self.new_entries.len());
        for (id, status) in &self.new_entries {
            let _ = writeln!(out, "  {id}: {status}");
        }
        let _ = writeln!(out, "changed: {}", self.changed_entries.len());
        for (id, status) in &self.changed_entries {
            let _ = writeln!(out, "  {id}: {status}");
        }
        let _ = writeln!(out, "removed: {}", self.removed_ids.len());
        for id in &self.removed_ids {
            let _ = writeln!(out, "  {id}");
        }
        out
    }

    /// Status distribution over new and changed entries
    pub fn report(&self) -> StatusReport<T>
    where
        T: Ord,
    {
        StatusReport::from_statuses(
            self.new_entries
                .values()
                .chain(self.changed_entries.values())
                .cloned(),
        )
    }
}

impl<Id, T> Display for StatusDiff<Id, T>
where
    Id: Ord + Clone + Display,
    T: Clone + Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.owner_label, self.short_info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::ResourceId;
    use crate::domain::status::AvailabilityStatus::{self, *};

    type Diff = StatusDiff<ResourceId, AvailabilityStatus>;

    fn id(s: &str) -> ResourceId {
        ResourceId::from(s)
    }

    fn diff() -> Diff {
        StatusDiff::new("DE*GEF", "GraphDefined", Utc::now())
    }

    #[test]
    fn bucket_sizes_match_add_calls() {
        let mut d = diff();
        d.add_new("E1".into(), Available)
            .add_new_many([(id("E2"), Charging), (id("E3"), Available)])
            .add_changed("E4".into(), Error)
            .add_removed_many([id("E5"), id("E6")]);

        assert_eq!(d.len(), 6);
        assert_eq!(d.short_info(), "3/1/2");
        assert_eq!(d.to_string(), "GraphDefined: 3/1/2");
    }

    #[test]
    #[should_panic(expected = "added twice")]
    fn same_id_in_two_buckets_panics() {
        let mut d = diff();
        d.add_new("E1".into(), Available);
        d.add_removed("E1".into());
    }

    #[test]
    fn between_classifies_entries() {
        let previous = BTreeMap::from([(id("E1"), Available), (id("E2"), Available), (id("E3"), Charging)]);
        let current = BTreeMap::from([(id("E1"), Available), (id("E2"), Charging), (id("E4"), Reserved)]);

        let d = Diff::between("DE*GEF", "GraphDefined", Utc::now(), &previous, &current);
        assert_eq!(d.new_entries().keys().collect::<Vec<_>>(), vec![&id("E4")]);
        assert_eq!(d.changed_entries().get(&id("E2")), Some(&Charging));
        assert!(d.removed_ids().contains(&id("E3")));
        assert_eq!(d.short_info(), "1/1/1");
    }

    #[test]
    fn extended_info_lists_every_entry() {
        let mut d = diff();
        d.add_new("E1".into(), Available)
            .add_changed("E2".into(), Charging)
            .add_removed("E3".into());

        let info = d.extended_info();
        assert!(info.starts_with("GraphDefined (DE*GEF) status diff at "));
        assert!(info.contains("new: 1\n  E1: Available\n"));
        assert!(info.contains("changed: 1\n  E2: Charging\n"));
        assert!(info.contains("removed: 1\n  E3\n"));
    }

    #[test]
    fn report_covers_new_and_changed() {
        let mut d = diff();
        d.add_new("E1".into(), Available)
            .add_changed("E2".into(), Available)
            .add_removed("E3".into());

        let report = d.report();
        assert_eq!(report.count(), 2);
        assert_eq!(report.count_of(&Available), 2);
    }
}
