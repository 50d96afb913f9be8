//! Status aggregation
//!
//! A parent's status is computed from its children's current statuses by
//! a pluggable [`AggregationPolicy`]. The default is a plurality vote
//! ([`MajorityPolicy`]) whose tie-break is explicit: either ascending
//! ordinal order of the status value, or a caller-supplied precedence list.

pub mod aggregator;
pub mod policy;

pub use aggregator::{AggregationOutcome, StatusAggregator};
pub use policy::{AggregationPolicy, MajorityPolicy, StatusCounts, TieBreak};
