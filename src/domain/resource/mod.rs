//! Resource hierarchy
//!
//! Identifiers, levels, paths and the tree node entity.

pub mod model;

pub use model::{ReservationLevel, ResourceId, ResourceLevel, ResourceNode, ResourcePath};
