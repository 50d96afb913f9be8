pub mod diff;
pub mod events;
pub mod reservations;
pub mod services;
pub mod tree;

// Re-export key types for convenience
pub use diff::{RenderedReport, StatusDiff, StatusReport, StatusSynchronizer};
pub use events::{create_event_bus, Event, EventBus, EventMessage, EventSubscriber, SharedEventBus};
pub use reservations::{start_reservation_sweep_task, ReservationStore};
pub use services::{NetworkOptions, RoamingNetwork};
pub use tree::ResourceTree;
