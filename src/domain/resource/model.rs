//! Resource hierarchy entities: operator → pool → station → charge point

use std::borrow::Borrow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::aggregation::StatusAggregator;
use crate::domain::error::TreeError;
use crate::domain::status::{AdminStatus, AvailabilityStatus, HistoryLimits, StatusSchedule};

/// Identifier of any node in the charging infrastructure tree
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for ResourceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Hierarchy level of a resource, outermost first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceLevel {
    Operator,
    Pool,
    Station,
    ChargePoint,
}

/// Reservations target a resource at one of the hierarchy levels
pub type ReservationLevel = ResourceLevel;

impl ResourceLevel {
    pub const ALL: [ResourceLevel; 4] = [
        ResourceLevel::Operator,
        ResourceLevel::Pool,
        ResourceLevel::Station,
        ResourceLevel::ChargePoint,
    ];

    /// Zero-based depth below the roaming network root
    pub fn depth(&self) -> usize {
        match self {
            Self::Operator => 0,
            Self::Pool => 1,
            Self::Station => 2,
            Self::ChargePoint => 3,
        }
    }

    pub fn from_depth(depth: usize) -> Option<Self> {
        Self::ALL.get(depth).copied()
    }

    pub fn parent_level(&self) -> Option<Self> {
        self.depth().checked_sub(1).and_then(Self::from_depth)
    }

    pub fn child_level(&self) -> Option<Self> {
        Self::from_depth(self.depth() + 1)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operator => "Operator",
            Self::Pool => "Pool",
            Self::Station => "Station",
            Self::ChargePoint => "ChargePoint",
        }
    }
}

impl std::fmt::Display for ResourceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ids from the operator down to a target resource, one per level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<ResourceId>", into = "Vec<ResourceId>")]
pub struct ResourcePath(Vec<ResourceId>);

impl TryFrom<Vec<ResourceId>> for ResourcePath {
    type Error = TreeError;

    fn try_from(ids: Vec<ResourceId>) -> Result<Self, Self::Error> {
        let len = ids.len();
        Self::from_ids(ids).ok_or(TreeError::InvalidPath(len))
    }
}

impl From<ResourcePath> for Vec<ResourceId> {
    fn from(path: ResourcePath) -> Self {
        path.0
    }
}

impl ResourcePath {
    /// Builds a path from root-first ids. Returns `None` unless it has
    /// between one and four elements.
    pub fn from_ids(ids: Vec<ResourceId>) -> Option<Self> {
        if ids.is_empty() || ids.len() > ResourceLevel::ALL.len() {
            return None;
        }
        Some(Self(ids))
    }

    pub fn level(&self) -> ResourceLevel {
        ResourceLevel::ALL[self.0.len() - 1]
    }

    pub fn target(&self) -> &ResourceId {
        &self.0[self.0.len() - 1]
    }

    pub fn ids(&self) -> &[ResourceId] {
        &self.0
    }

    pub fn id_at(&self, level: ResourceLevel) -> Option<&ResourceId> {
        self.0.get(level.depth())
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.0.contains(id)
    }

    /// True when one path is an ancestor-or-self of the other
    pub fn overlaps(&self, other: &ResourcePath) -> bool {
        let shared = self.0.len().min(other.0.len());
        self.0[..shared] == other.0[..shared]
    }
}

impl std::fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" / ")?;
            }
            write!(f, "{}", id)?;
        }
        Ok(())
    }
}

/// A node of the resource tree.
///
/// The parent is held by id only and resolved through the tree.
#[derive(Debug)]
pub struct ResourceNode {
    id: ResourceId,
    level: ResourceLevel,
    parent_id: Option<ResourceId>,
    child_ids: Vec<ResourceId>,
    admin_status: StatusSchedule<AdminStatus>,
    status: StatusSchedule<AvailabilityStatus>,
    aggregator: Option<StatusAggregator<AvailabilityStatus>>,
    created_at: DateTime<Utc>,
}

impl ResourceNode {
    pub fn new(
        id: ResourceId,
        level: ResourceLevel,
        parent_id: Option<ResourceId>,
        limits: HistoryLimits,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            level,
            parent_id,
            child_ids: Vec::new(),
            admin_status: StatusSchedule::placeholder(AdminStatus::default(), created_at, limits),
            status: StatusSchedule::placeholder(AvailabilityStatus::default(), created_at, limits),
            aggregator: None,
            created_at,
        }
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn level(&self) -> ResourceLevel {
        self.level
    }

    pub fn parent_id(&self) -> Option<&ResourceId> {
        self.parent_id.as_ref()
    }

    pub fn child_ids(&self) -> &[ResourceId] {
        &self.child_ids
    }

    pub fn has_children(&self) -> bool {
        !self.child_ids.is_empty()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> &StatusSchedule<AvailabilityStatus> {
        &self.status
    }

    pub fn admin_status(&self) -> &StatusSchedule<AdminStatus> {
        &self.admin_status
    }

    pub fn aggregator(&self) -> Option<&StatusAggregator<AvailabilityStatus>> {
        self.aggregator.as_ref()
    }

    pub(crate) fn status_mut(&mut self) -> &mut StatusSchedule<AvailabilityStatus> {
        &mut self.status
    }

    pub(crate) fn admin_status_mut(&mut self) -> &mut StatusSchedule<AdminStatus> {
        &mut self.admin_status
    }

    pub(crate) fn set_aggregator(&mut self, aggregator: Option<StatusAggregator<AvailabilityStatus>>) {
        self.aggregator = aggregator;
    }

    /// Returns false if the child was already attached
    pub(crate) fn add_child(&mut self, child_id: ResourceId) -> bool {
        if self.child_ids.contains(&child_id) {
            return false;
        }
        self.child_ids.push(child_id);
        true
    }

    /// Returns false if the child was not attached
    pub(crate) fn remove_child(&mut self, child_id: &ResourceId) -> bool {
        let len_before = self.child_ids.len();
        self.child_ids.retain(|c| c != child_id);
        self.child_ids.len() < len_before
    }
}
