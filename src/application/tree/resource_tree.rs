//! Resource tree: owns every node and propagates status changes upward
//!
//! Each node sits behind its own mutex, so updates to one node and the
//! notifications they fire are totally ordered. Locks are only ever
//! nested parent → child (during aggregation); a child's lock is always
//! released before its parent is recomputed.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::application::events::{
    AdminStatusChangedEvent, Event, SharedEventBus, StatusChangedEvent,
};
use crate::domain::aggregation::{AggregationOutcome, AggregationPolicy, StatusAggregator};
use crate::domain::error::{TreeError, TreeResult};
use crate::domain::ports::{Clock, ResourceLookup, SystemClock};
use crate::domain::resource::{ResourceId, ResourceLevel, ResourceNode, ResourcePath};
use crate::domain::status::{
    AdminStatus, AvailabilityStatus, HistoryLimits, StatusChange, StatusObserver, StatusUpdate,
    StatusValue,
};
use crate::shared::lock;

type SharedNode = Arc<Mutex<ResourceNode>>;

/// Operators → pools → stations → charge points
pub struct ResourceTree {
    nodes: DashMap<ResourceId, SharedNode>,
    operators: Mutex<Vec<ResourceId>>,
    limits: HistoryLimits,
    default_aggregator: StatusAggregator<AvailabilityStatus>,
    clock: Arc<dyn Clock>,
    event_bus: Option<SharedEventBus>,
}

impl ResourceTree {
    pub fn new(limits: HistoryLimits, default_aggregator: StatusAggregator<AvailabilityStatus>) -> Self {
        Self {
            nodes: DashMap::new(),
            operators: Mutex::new(Vec::new()),
            limits,
            default_aggregator,
            clock: Arc::new(SystemClock),
            event_bus: None,
        }
    }

    /// Stamps node creation and aggregation passes not driven by a write
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_bus(mut self, event_bus: SharedEventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    fn node(&self, id: &ResourceId) -> TreeResult<SharedNode> {
        self.nodes
            .get(id)
            .map(|n| Arc::clone(n.value()))
            .ok_or_else(|| TreeError::UnknownResource(id.clone()))
    }

    // ── Structure ──────────────────────────────────────────────

    pub fn add_operator(&self, id: impl Into<ResourceId>) -> TreeResult<()> {
        self.add_resource(id, ResourceLevel::Operator, None)
    }

    pub fn add_pool(&self, id: impl Into<ResourceId>, operator_id: &ResourceId) -> TreeResult<()> {
        self.add_resource(id, ResourceLevel::Pool, Some(operator_id))
    }

    pub fn add_station(&self, id: impl Into<ResourceId>, pool_id: &ResourceId) -> TreeResult<()> {
        self.add_resource(id, ResourceLevel::Station, Some(pool_id))
    }

    pub fn add_charge_point(&self, id: impl Into<ResourceId>, station_id: &ResourceId) -> TreeResult<()> {
        self.add_resource(id, ResourceLevel::ChargePoint, Some(station_id))
    }

    /// Adds a node under `parent_id`, which must sit exactly one level up.
    /// Operators take no parent.
    pub fn add_resource(
        &self,
        id: impl Into<ResourceId>,
        level: ResourceLevel,
        parent_id: Option<&ResourceId>,
    ) -> TreeResult<()> {
        let id = id.into();
        let invalid_parent = || TreeError::InvalidParent {
            child: id.clone(),
            level,
            parent: parent_id.cloned(),
        };

        let parent = match (level.parent_level(), parent_id) {
            (None, None) => None,
            (Some(expected), Some(pid)) => {
                let parent = self.node(pid).map_err(|_| invalid_parent())?;
                if lock(&parent).level() != expected {
                    return Err(invalid_parent());
                }
                Some(parent)
            }
            _ => return Err(invalid_parent()),
        };

        let now = self.clock.now();
        let node = ResourceNode::new(id.clone(), level, parent_id.cloned(), self.limits, now);
        match self.nodes.entry(id.clone()) {
            Entry::Occupied(_) => return Err(TreeError::DuplicateResource(id)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(node)));
            }
        }

        match (parent, parent_id) {
            (Some(parent), Some(pid)) => {
                let mut guard = lock(&parent);
                // The parent may have been removed since it was looked up
                let attached = self
                    .nodes
                    .get(pid)
                    .is_some_and(|current| Arc::ptr_eq(current.value(), &parent));
                if !attached {
                    drop(guard);
                    self.nodes.remove(&id);
                    return Err(invalid_parent());
                }
                guard.add_child(id.clone());
            }
            _ => lock(&self.operators).push(id.clone()),
        }
        debug!(resource_id = %id, %level, "Resource added");

        if let Some(pid) = parent_id {
            self.propagate(pid.clone(), now);
        }
        Ok(())
    }

    /// Removes `id` and its whole subtree. Returns the removed ids.
    ///
    /// Reservations that reference removed ids are not touched.
    pub fn remove_resource(&self, id: &ResourceId) -> TreeResult<Vec<ResourceId>> {
        let node = self.node(id)?;
        let parent_id = lock(&node).parent_id().cloned();

        match &parent_id {
            Some(pid) => {
                if let Ok(parent) = self.node(pid) {
                    lock(&parent).remove_child(id);
                }
            }
            None => lock(&self.operators).retain(|o| o != id),
        }

        let mut removed = Vec::new();
        let mut pending = vec![id.clone()];
        while let Some(current) = pending.pop() {
            if let Some((_, node)) = self.nodes.remove(&current) {
                pending.extend(lock(&node).child_ids().iter().cloned());
                removed.push(current);
            }
        }
        info!(resource_id = %id, removed = removed.len(), "Resource subtree removed");

        if let Some(pid) = parent_id {
            self.propagate(pid, self.clock.now());
        }
        Ok(removed)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn level_of(&self, id: &ResourceId) -> TreeResult<ResourceLevel> {
        let node = self.node(id)?;
        let level = lock(&node).level();
        Ok(level)
    }

    pub fn parent_of(&self, id: &ResourceId) -> TreeResult<Option<ResourceId>> {
        let node = self.node(id)?;
        let parent_id = lock(&node).parent_id().cloned();
        Ok(parent_id)
    }

    pub fn children_of(&self, id: &ResourceId) -> TreeResult<Vec<ResourceId>> {
        let node = self.node(id)?;
        let children = lock(&node).child_ids().to_vec();
        Ok(children)
    }

    pub fn operators(&self) -> Vec<ResourceId> {
        lock(&self.operators).clone()
    }

    /// All ids at `level`, sorted
    pub fn ids_at(&self, level: ResourceLevel) -> Vec<ResourceId> {
        let nodes: Vec<(ResourceId, SharedNode)> = self
            .nodes
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut ids: Vec<ResourceId> = nodes
            .into_iter()
            .filter(|(_, node)| lock(node).level() == level)
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        ids
    }

    // ── Status ─────────────────────────────────────────────────

    /// Writes `status` if it differs from the current value; an equal
    /// value only refreshes the timestamp.
    pub fn set_status(
        &self,
        id: &ResourceId,
        status: AvailabilityStatus,
        timestamp: impl Into<DateTime<Utc>>,
    ) -> TreeResult<StatusUpdate<AvailabilityStatus>> {
        self.write_status(id, status, timestamp.into(), false)
    }

    /// Records `status` as a new history entry even if unchanged.
    pub fn record_status(
        &self,
        id: &ResourceId,
        status: AvailabilityStatus,
        timestamp: impl Into<DateTime<Utc>>,
    ) -> TreeResult<StatusUpdate<AvailabilityStatus>> {
        self.write_status(id, status, timestamp.into(), true)
    }

    fn write_status(
        &self,
        id: &ResourceId,
        status: AvailabilityStatus,
        timestamp: DateTime<Utc>,
        always_record: bool,
    ) -> TreeResult<StatusUpdate<AvailabilityStatus>> {
        let node = self.node(id)?;
        let (update, parent_id) = {
            let mut guard = lock(&node);
            let update = if always_record {
                guard.status_mut().record_status(status, timestamp)
            } else {
                guard.status_mut().set_status(status, timestamp)
            };

            match &update {
                StatusUpdate::Changed(change) => {
                    info!(
                        resource_id = %id,
                        level = %guard.level(),
                        old = %change.old,
                        new = %change.new,
                        "Status changed"
                    );
                    self.publish_status_change(&guard, change);
                }
                StatusUpdate::Stale => {
                    debug!(resource_id = %id, %timestamp, "Ignoring stale status update");
                }
                StatusUpdate::Refreshed | StatusUpdate::Recorded => {}
            }
            (update, guard.parent_id().cloned())
        };

        if update.is_changed() {
            if let Some(pid) = parent_id {
                self.propagate(pid, timestamp);
            }
        }
        Ok(update)
    }

    pub fn set_admin_status(
        &self,
        id: &ResourceId,
        status: AdminStatus,
        timestamp: impl Into<DateTime<Utc>>,
    ) -> TreeResult<StatusUpdate<AdminStatus>> {
        let node = self.node(id)?;
        let mut guard = lock(&node);
        let update = guard.admin_status_mut().set_status(status, timestamp);

        if let StatusUpdate::Changed(change) = &update {
            info!(
                resource_id = %id,
                old = %change.old,
                new = %change.new,
                "Admin status changed"
            );
            if let Some(bus) = &self.event_bus {
                bus.publish(Event::AdminStatusChanged(AdminStatusChangedEvent {
                    resource_id: id.clone(),
                    level: guard.level(),
                    old_status: change.old,
                    new_status: change.new,
                    timestamp: change.timestamp,
                }));
            }
        }
        Ok(update)
    }

    pub fn status(&self, id: &ResourceId) -> TreeResult<StatusValue<AvailabilityStatus>> {
        let node = self.node(id)?;
        let current = lock(&node).status().current().clone();
        Ok(current)
    }

    /// Newest first
    pub fn status_history(&self, id: &ResourceId) -> TreeResult<Vec<StatusValue<AvailabilityStatus>>> {
        let node = self.node(id)?;
        let history = lock(&node).status().history().cloned().collect();
        Ok(history)
    }

    pub fn admin_status(&self, id: &ResourceId) -> TreeResult<StatusValue<AdminStatus>> {
        let node = self.node(id)?;
        let current = lock(&node).admin_status().current().clone();
        Ok(current)
    }

    pub fn admin_status_history(&self, id: &ResourceId) -> TreeResult<Vec<StatusValue<AdminStatus>>> {
        let node = self.node(id)?;
        let history = lock(&node).admin_status().history().cloned().collect();
        Ok(history)
    }

    /// Observer runs under the node lock; it must not call back into the tree.
    pub fn subscribe(
        &self,
        id: &ResourceId,
        observer: Arc<dyn StatusObserver<AvailabilityStatus>>,
    ) -> TreeResult<()> {
        let node = self.node(id)?;
        lock(&node).status_mut().subscribe(observer);
        Ok(())
    }

    pub fn subscribe_admin(
        &self,
        id: &ResourceId,
        observer: Arc<dyn StatusObserver<AdminStatus>>,
    ) -> TreeResult<()> {
        let node = self.node(id)?;
        lock(&node).admin_status_mut().subscribe(observer);
        Ok(())
    }

    /// Current status of every node, optionally restricted to one level
    pub fn snapshot(&self, level: Option<ResourceLevel>) -> BTreeMap<ResourceId, AvailabilityStatus> {
        let nodes: Vec<SharedNode> = self.nodes.iter().map(|e| Arc::clone(e.value())).collect();
        nodes
            .iter()
            .filter_map(|node| {
                let guard = lock(node);
                if level.map_or(true, |l| guard.level() == l) {
                    Some((guard.id().clone(), *guard.status().current_value()))
                } else {
                    None
                }
            })
            .collect()
    }

    // ── Aggregation ────────────────────────────────────────────

    /// Replaces the node's policy; `None` restores the tree default.
    pub fn set_aggregation_policy(
        &self,
        id: &ResourceId,
        policy: Option<Arc<dyn AggregationPolicy<AvailabilityStatus>>>,
    ) -> TreeResult<AggregationOutcome<AvailabilityStatus>> {
        let node = self.node(id)?;
        lock(&node).set_aggregator(policy.map(StatusAggregator::new));
        self.recompute(id)
    }

    /// Recomputes `id` from its children and, if it changed, its ancestors.
    pub fn recompute(&self, id: &ResourceId) -> TreeResult<AggregationOutcome<AvailabilityStatus>> {
        let now = self.clock.now();
        let outcome = self.recompute_node(id, now)?;
        if outcome.is_changed() {
            if let Some(pid) = self.parent_of(id)? {
                self.propagate(pid, now);
            }
        }
        Ok(outcome)
    }

    /// Bottom-up pass over every parent. Returns how many changed.
    pub fn recompute_all(&self) -> usize {
        let now = self.clock.now();
        [ResourceLevel::Station, ResourceLevel::Pool, ResourceLevel::Operator]
            .into_iter()
            .flat_map(|level| self.ids_at(level))
            .filter(|id| {
                self.recompute_node(id, now)
                    .map(|outcome| outcome.is_changed())
                    .unwrap_or(false)
            })
            .count()
    }

    fn propagate(&self, start: ResourceId, timestamp: DateTime<Utc>) {
        let mut current = Some(start);
        while let Some(id) = current.take() {
            if let Ok(outcome) = self.recompute_node(&id, timestamp) {
                if outcome.is_changed() {
                    current = self.parent_of(&id).ok().flatten();
                }
            }
        }
    }

    fn recompute_node(
        &self,
        id: &ResourceId,
        timestamp: DateTime<Utc>,
    ) -> TreeResult<AggregationOutcome<AvailabilityStatus>> {
        let node = self.node(id)?;
        let mut guard = lock(&node);

        // Leaves keep whatever was written directly
        if !guard.has_children() {
            return Ok(AggregationOutcome::Unchanged);
        }

        let statuses: Vec<AvailabilityStatus> = guard
            .child_ids()
            .iter()
            .filter_map(|child_id| self.node(child_id).ok())
            .map(|child| *lock(&child).status().current_value())
            .collect();

        let aggregator = guard
            .aggregator()
            .cloned()
            .unwrap_or_else(|| self.default_aggregator.clone());
        let outcome = aggregator.apply(guard.status_mut(), statuses, timestamp);

        match &outcome {
            AggregationOutcome::Changed(change) => {
                info!(
                    resource_id = %id,
                    level = %guard.level(),
                    old = %change.old,
                    new = %change.new,
                    "Aggregate status changed"
                );
                self.publish_status_change(&guard, change);
            }
            AggregationOutcome::Skipped(e) => {
                warn!(resource_id = %id, error = %e, "Aggregation skipped, keeping previous status");
            }
            AggregationOutcome::Unchanged => {}
        }
        Ok(outcome)
    }

    fn publish_status_change(&self, node: &ResourceNode, change: &StatusChange<AvailabilityStatus>) {
        if let Some(bus) = &self.event_bus {
            bus.publish(Event::StatusChanged(StatusChangedEvent {
                resource_id: node.id().clone(),
                level: node.level(),
                old_status: change.old,
                new_status: change.new,
                timestamp: change.timestamp,
            }));
        }
    }
}

impl Default for ResourceTree {
    fn default() -> Self {
        Self::new(HistoryLimits::default(), StatusAggregator::default())
    }
}

impl ResourceLookup for ResourceTree {
    fn resolve_path(&self, id: &ResourceId, level: ResourceLevel) -> Option<ResourcePath> {
        let mut ids = Vec::with_capacity(level.depth() + 1);
        let mut current = Some(id.clone());
        let mut expected = Some(level);

        while let Some(current_id) = current.take() {
            let node = self.node(&current_id).ok()?;
            let guard = lock(&node);
            if Some(guard.level()) != expected {
                return None;
            }
            expected = guard.level().parent_level();
            current = guard.parent_id().cloned();
            ids.push(current_id);
        }

        if expected.is_some() {
            return None;
        }
        ids.reverse();
        ResourcePath::from_ids(ids)
    }

    fn current_status(&self, id: &ResourceId) -> Option<AvailabilityStatus> {
        self.node(id)
            .ok()
            .map(|node| *lock(&node).status().current_value())
    }

    fn current_admin_status(&self, id: &ResourceId) -> Option<AdminStatus> {
        self.node(id)
            .ok()
            .map(|node| *lock(&node).admin_status().current_value())
    }
}
