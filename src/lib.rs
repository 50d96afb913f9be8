//! # Texnouz Roaming Core
//!
//! Availability tracking and reservation engine for a roaming network of
//! charging resources (operators, pools, stations, charge points).
//!
//! ## Architecture
//!
//! The project follows Clean Architecture principles:
//!
//! - **domain**: Status values and schedules, resources, reservations,
//!   aggregation policies, errors and ports
//! - **application**: Resource tree, reservation store, status diffs and
//!   reports, event bus
//! - **shared**: Shutdown coordination
//! - **config**: TOML configuration

pub mod application;
pub mod config;
pub mod domain;
pub mod shared;

pub use config::{default_config_path, AppConfig};

pub use application::{
    create_event_bus, Event, EventBus, NetworkOptions, ReservationStore, ResourceTree,
    RoamingNetwork, SharedEventBus, StatusDiff, StatusReport, StatusSynchronizer,
};
pub use domain::{
    AvailabilityStatus, ReservationFailure, ReservationId, ReserveRequest, Reservation,
    ResourceId, ResourceLevel,
};
