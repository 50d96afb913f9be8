//! Domain errors

use thiserror::Error;

use crate::domain::reservation::ReservationId;
use crate::domain::resource::{ResourceId, ResourceLevel};

/// Why a reservation operation did not succeed.
///
/// Returned as a value; a transport adapter maps each kind onto its own
/// roaming-protocol response code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReservationFailure {
    #[error("Unknown resource: {0}")]
    UnknownResource(ResourceId),

    #[error("Resource {0} is out of service")]
    ResourceOutOfService(ResourceId),

    #[error("Resource {resource_id} is already reserved by {reservation_id}")]
    ResourceAlreadyReserved {
        resource_id: ResourceId,
        reservation_id: ReservationId,
    },

    #[error("Resource {0} is already in use")]
    ResourceAlreadyInUse(ResourceId),

    #[error("Reservation id {0} is already in use")]
    ReservationIdAlreadyInUse(ReservationId),

    #[error("Unknown reservation: {0}")]
    UnknownReservation(ReservationId),

    #[error("Reservation {0} has expired")]
    ReservationExpired(ReservationId),

    /// Reported by an external transport; not interpreted here
    #[error("Reservation request timed out")]
    Timeout,

    #[error("Reservation error: {0}")]
    Error(String),
}

impl ReservationFailure {
    /// Whether a roaming partner may reasonably retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Error(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownResource(_) => "unknown_resource",
            Self::ResourceOutOfService(_) => "resource_out_of_service",
            Self::ResourceAlreadyReserved { .. } => "resource_already_reserved",
            Self::ResourceAlreadyInUse(_) => "resource_already_in_use",
            Self::ReservationIdAlreadyInUse(_) => "reservation_id_already_in_use",
            Self::UnknownReservation(_) => "unknown_reservation",
            Self::ReservationExpired(_) => "reservation_expired",
            Self::Timeout => "timeout",
            Self::Error(_) => "error",
        }
    }
}

/// Result type for reservation operations
pub type ReservationResult<T> = Result<T, ReservationFailure>;

/// Structural errors of the resource tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("Unknown resource: {0}")]
    UnknownResource(ResourceId),

    #[error("Resource already exists: {0}")]
    DuplicateResource(ResourceId),

    #[error("Invalid parent for {level} {child}: {parent:?}")]
    InvalidParent {
        child: ResourceId,
        level: ResourceLevel,
        parent: Option<ResourceId>,
    },

    #[error("Resource path must have 1 to 4 ids, got {0}")]
    InvalidPath(usize),
}

/// Result type for resource tree operations
pub type TreeResult<T> = Result<T, TreeError>;

/// Raised by an aggregation policy that cannot produce a status
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("No child statuses to aggregate")]
    NoChildren,

    #[error("Aggregation policy failed: {0}")]
    Policy(String),
}
