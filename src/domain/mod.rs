pub mod aggregation;
pub mod error;
pub mod events;
pub mod ports;
pub mod reservation;
pub mod resource;
pub mod status;

// Re-export commonly used types
pub use aggregation::{AggregationOutcome, AggregationPolicy, MajorityPolicy, StatusAggregator, StatusCounts, TieBreak};
pub use error::{AggregationError, ReservationFailure, ReservationResult, TreeError, TreeResult};
pub use events::{Event, EventMessage};
pub use ports::{Clock, ManualClock, ReservationIdGenerator, ResourceLookup, SequentialIds, SystemClock, UuidReservationIds};
pub use reservation::{ReleaseReason, ReserveRequest, Reservation, ReservationId, ReservationState, SessionId};
pub use resource::{ReservationLevel, ResourceId, ResourceLevel, ResourceNode, ResourcePath};
pub use status::{AdminStatus, AvailabilityStatus, HistoryLimits, StatusChange, StatusObserver, StatusSchedule, StatusUpdate, StatusValue};
