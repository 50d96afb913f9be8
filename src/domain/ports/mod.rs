//! Domain ports
//!
//! Capabilities the core depends on but does not own: time, id
//! generation and read access to the resource tree. Injected so the
//! engine stays deterministic under test.

pub mod clock;
pub mod ids;
pub mod resources;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ids::{ReservationIdGenerator, SequentialIds, UuidReservationIds};
pub use resources::ResourceLookup;
