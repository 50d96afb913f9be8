//! Status values, schedules and the status enums tracked per resource.

pub mod model;
pub mod schedule;
pub mod value;

pub use model::{AdminStatus, AvailabilityStatus};
pub use schedule::{HistoryLimits, StatusChange, StatusObserver, StatusSchedule, StatusUpdate};
pub use value::StatusValue;
