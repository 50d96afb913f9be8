//! Status value types tracked per resource

use serde::{Deserialize, Serialize};

/// Operational availability of a resource.
///
/// The declaration order is the ordinal order used by the default
/// aggregation tie-break (ascending, so `Available` wins a tie).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum AvailabilityStatus {
    Available,
    Reserved,
    Charging,
    Blocked,
    OutOfService,
    Offline,
    Error,
    #[default]
    Unknown,
}

impl AvailabilityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Reserved => "Reserved",
            Self::Charging => "Charging",
            Self::Blocked => "Blocked",
            Self::OutOfService => "OutOfService",
            Self::Offline => "Offline",
            Self::Error => "Error",
            Self::Unknown => "Unknown",
        }
    }

    /// Resource is running a charging session right now
    pub fn is_in_use(&self) -> bool {
        *self == Self::Charging
    }

    pub fn is_out_of_service(&self) -> bool {
        *self == Self::OutOfService
    }
}

impl std::fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for AvailabilityStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "available" => Self::Available,
            "reserved" => Self::Reserved,
            "charging" => Self::Charging,
            "blocked" => Self::Blocked,
            "outofservice" | "out_of_service" => Self::OutOfService,
            "offline" => Self::Offline,
            "error" | "faulted" => Self::Error,
            _ => Self::Unknown,
        }
    }
}

/// Administrative status, set by the operator and never aggregated.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum AdminStatus {
    #[default]
    Operational,
    Maintenance,
    Blocked,
    OutOfService,
    Unknown,
}

impl AdminStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operational => "Operational",
            Self::Maintenance => "Maintenance",
            Self::Blocked => "Blocked",
            Self::OutOfService => "OutOfService",
            Self::Unknown => "Unknown",
        }
    }

    pub fn is_out_of_service(&self) -> bool {
        *self == Self::OutOfService
    }
}

impl std::fmt::Display for AdminStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for AdminStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "operational" => Self::Operational,
            "maintenance" => Self::Maintenance,
            "blocked" => Self::Blocked,
            "outofservice" | "out_of_service" => Self::OutOfService,
            _ => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinal_order_puts_available_first() {
        assert!(AvailabilityStatus::Available < AvailabilityStatus::Charging);
        assert!(AvailabilityStatus::Error < AvailabilityStatus::Unknown);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(AvailabilityStatus::from("CHARGING"), AvailabilityStatus::Charging);
        assert_eq!(AvailabilityStatus::from("out_of_service"), AvailabilityStatus::OutOfService);
        assert_eq!(AvailabilityStatus::from("bogus"), AvailabilityStatus::Unknown);
        assert_eq!(AdminStatus::from("Maintenance"), AdminStatus::Maintenance);
    }

    #[test]
    fn defaults() {
        assert_eq!(AvailabilityStatus::default(), AvailabilityStatus::Unknown);
        assert_eq!(AdminStatus::default(), AdminStatus::Operational);
    }
}
