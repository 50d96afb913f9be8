//! Status diff engine
//!
//! Nothing here performs I/O; diffs and reports are handed to an
//! external transport.

pub mod report;
pub mod status_diff;
pub mod synchronizer;

pub use report::{RenderedReport, StatusReport, StatusShare, STATUS_REPORT_CONTEXT};
pub use status_diff::StatusDiff;
pub use synchronizer::StatusSynchronizer;
