//! Read access to the resource tree

use crate::domain::resource::{ResourceId, ResourceLevel, ResourcePath};
use crate::domain::status::{AdminStatus, AvailabilityStatus};

/// What the reservation store needs to know about resources
pub trait ResourceLookup: Send + Sync {
    /// Path from the operator down to `id`, if `id` exists at `level`
    fn resolve_path(&self, id: &ResourceId, level: ResourceLevel) -> Option<ResourcePath>;

    fn current_status(&self, id: &ResourceId) -> Option<AvailabilityStatus>;

    fn current_admin_status(&self, id: &ResourceId) -> Option<AdminStatus>;
}
