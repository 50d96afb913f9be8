//! Reservation aggregate
//!
//! Contains the Reservation entity and the request type used to create one.

pub mod model;

pub use model::{
    ReleaseReason, ReserveRequest, Reservation, ReservationId, ReservationState, SessionId,
};
