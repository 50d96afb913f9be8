//! Reservation domain entity

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::resource::{ReservationLevel, ResourceId, ResourcePath};

/// Unique reservation identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(String);

impl ReservationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReservationId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ReservationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Charging session bound to a reservation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Lifecycle state, derived from the reservation and the current time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationState {
    /// Not expired, no session bound
    Active,
    /// A charging session is bound; expiry is suspended
    InUse,
    /// Past its end time (plus grace) but not yet released
    Expired,
    /// Terminal
    Released,
}

impl ReservationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::InUse => "InUse",
            Self::Expired => "Expired",
            Self::Released => "Released",
        }
    }
}

impl std::fmt::Display for ReservationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a reservation was released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseReason {
    /// Explicit cancel
    Cancelled,
    /// Released by the expiry sweep
    Expired,
    /// The bound session completed
    Consumed,
}

impl ReleaseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cancelled => "Cancelled",
            Self::Expired => "Expired",
            Self::Consumed => "Consumed",
        }
    }
}

impl std::fmt::Display for ReleaseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parameters of a reservation request
#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub resource_id: ResourceId,
    pub level: ReservationLevel,
    pub start_time: DateTime<Utc>,
    pub duration: Duration,
    /// Caller-chosen id; generated when absent
    pub reservation_id: Option<ReservationId>,
    pub provider_id: Option<String>,
    pub account_id: Option<String>,
    pub authorized_tokens: BTreeSet<String>,
    pub authorized_account_ids: BTreeSet<String>,
    pub authorized_pins: BTreeSet<String>,
    /// Reserve even while the resource is charging
    pub allow_in_use: bool,
}

impl ReserveRequest {
    /// `start_time` is normalized to UTC here.
    pub fn new(
        resource_id: impl Into<ResourceId>,
        level: ReservationLevel,
        start_time: impl Into<DateTime<Utc>>,
        duration: Duration,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            level,
            start_time: start_time.into(),
            duration,
            reservation_id: None,
            provider_id: None,
            account_id: None,
            authorized_tokens: BTreeSet::new(),
            authorized_account_ids: BTreeSet::new(),
            authorized_pins: BTreeSet::new(),
            allow_in_use: false,
        }
    }

    pub fn with_reservation_id(mut self, id: impl Into<ReservationId>) -> Self {
        self.reservation_id = Some(id.into());
        self
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn authorize_token(mut self, token: impl Into<String>) -> Self {
        self.authorized_tokens.insert(token.into());
        self
    }

    pub fn authorize_account(mut self, account_id: impl Into<String>) -> Self {
        self.authorized_account_ids.insert(account_id.into());
        self
    }

    pub fn authorize_pin(mut self, pin: impl Into<String>) -> Self {
        self.authorized_pins.insert(pin.into());
        self
    }

    pub fn allow_in_use(mut self) -> Self {
        self.allow_in_use = true;
        self
    }

    /// `start_time + duration` (negative durations count as zero), or
    /// `None` when that is past the representable range
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
            .checked_add_signed(self.duration.max(Duration::zero()))
    }
}

/// A time-bounded hold on a resource.
///
/// Resources are referenced by id only; a reservation stays readable
/// after its resource is removed from the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    id: ReservationId,
    created_at: DateTime<Utc>,
    start_time: DateTime<Utc>,
    duration: Duration,
    end_time: DateTime<Utc>,
    consumed_time: Duration,
    path: ResourcePath,
    provider_id: Option<String>,
    account_id: Option<String>,
    authorized_tokens: BTreeSet<String>,
    authorized_account_ids: BTreeSet<String>,
    authorized_pins: BTreeSet<String>,
    bound_session: Option<SessionId>,
    released_at: Option<DateTime<Utc>>,
    release_reason: Option<ReleaseReason>,
}

impl Reservation {
    /// Negative durations are clamped to zero, an unrepresentable end
    /// time to `DateTime::<Utc>::MAX_UTC`.
    pub fn new(
        id: ReservationId,
        path: ResourcePath,
        request: ReserveRequest,
        created_at: DateTime<Utc>,
    ) -> Self {
        let duration = request.duration.max(Duration::zero());
        let end_time = request.end_time().unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            id,
            created_at,
            start_time: request.start_time,
            duration,
            end_time,
            consumed_time: Duration::zero(),
            path,
            provider_id: request.provider_id,
            account_id: request.account_id,
            authorized_tokens: request.authorized_tokens,
            authorized_account_ids: request.authorized_account_ids,
            authorized_pins: request.authorized_pins,
            bound_session: None,
            released_at: None,
            release_reason: None,
        }
    }

    pub fn id(&self) -> &ReservationId {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    pub fn consumed_time(&self) -> Duration {
        self.consumed_time
    }

    pub fn level(&self) -> ReservationLevel {
        self.path.level()
    }

    /// The reserved resource
    pub fn resource_id(&self) -> &ResourceId {
        self.path.target()
    }

    /// Ids from the operator down to the reserved resource
    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn provider_id(&self) -> Option<&str> {
        self.provider_id.as_deref()
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    pub fn authorized_tokens(&self) -> &BTreeSet<String> {
        &self.authorized_tokens
    }

    pub fn authorized_account_ids(&self) -> &BTreeSet<String> {
        &self.authorized_account_ids
    }

    pub fn authorized_pins(&self) -> &BTreeSet<String> {
        &self.authorized_pins
    }

    pub fn bound_session(&self) -> Option<&SessionId> {
        self.bound_session.as_ref()
    }

    pub fn released_at(&self) -> Option<DateTime<Utc>> {
        self.released_at
    }

    pub fn release_reason(&self) -> Option<ReleaseReason> {
        self.release_reason
    }

    pub fn is_released(&self) -> bool {
        self.release_reason.is_some()
    }

    pub fn has_session(&self) -> bool {
        self.bound_session.is_some()
    }

    /// False while a session is bound; otherwise `now > end + grace`.
    pub fn is_expired(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        if self.has_session() {
            return false;
        }
        self.end_time
            .checked_add_signed(grace.max(Duration::zero()))
            .is_some_and(|deadline| now > deadline)
    }

    pub fn state(&self, now: DateTime<Utc>, grace: Duration) -> ReservationState {
        if self.is_released() {
            ReservationState::Released
        } else if self.has_session() {
            ReservationState::InUse
        } else if self.is_expired(now, grace) {
            ReservationState::Expired
        } else {
            ReservationState::Active
        }
    }

    /// Not released and not expired
    pub fn is_active(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        matches!(
            self.state(now, grace),
            ReservationState::Active | ReservationState::InUse
        )
    }

    /// Time until `end_time`, never negative
    pub fn time_left(&self, now: DateTime<Utc>) -> Duration {
        (self.end_time - now).max(Duration::zero())
    }

    /// An empty token set authorizes anyone
    pub fn authorizes_token(&self, token: &str) -> bool {
        self.authorized_tokens.is_empty() || self.authorized_tokens.contains(token)
    }

    pub fn authorizes_account(&self, account_id: &str) -> bool {
        self.authorized_account_ids.is_empty()
            || self.authorized_account_ids.contains(account_id)
            || self.account_id.as_deref() == Some(account_id)
    }

    pub fn authorizes_pin(&self, pin: &str) -> bool {
        self.authorized_pins.is_empty() || self.authorized_pins.contains(pin)
    }

    pub(crate) fn bind_session(&mut self, session_id: SessionId) {
        self.bound_session = Some(session_id);
    }

    /// Adds `delta` (negative deltas are ignored). While a session is
    /// bound the total never exceeds `now - start_time`.
    pub(crate) fn add_consumed_time(&mut self, delta: Duration, now: DateTime<Utc>) {
        let mut consumed = self
            .consumed_time
            .checked_add(&delta.max(Duration::zero()))
            .unwrap_or(Duration::MAX);
        if self.has_session() {
            consumed = consumed.min((now - self.start_time).max(Duration::zero()));
        }
        self.consumed_time = consumed;
    }

    pub(crate) fn release(&mut self, reason: ReleaseReason, at: DateTime<Utc>) {
        if self.release_reason.is_none() {
            self.release_reason = Some(reason);
            self.released_at = Some(at);
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::ResourceLevel;

    fn path() -> ResourcePath {
        ResourcePath::from_ids(vec!["DE*GEF".into(), "P1".into(), "S1".into(), "DE*GEF*E1".into()])
            .unwrap()
    }

    fn reservation(now: DateTime<Utc>) -> Reservation {
        let request = ReserveRequest::new("DE*GEF*E1", ResourceLevel::ChargePoint, now, Duration::minutes(30))
            .authorize_token("TAG-001");
        Reservation::new("R1".into(), path(), request, now)
    }

    #[test]
    fn end_time_is_start_plus_duration() {
        let now = Utc::now();
        let r = reservation(now);
        assert_eq!(r.end_time(), now + Duration::minutes(30));
        assert_eq!(r.level(), ResourceLevel::ChargePoint);
        assert_eq!(r.resource_id().as_str(), "DE*GEF*E1");
    }

    #[test]
    fn expires_strictly_after_end_time() {
        let now = Utc::now();
        let r = reservation(now);
        assert!(!r.is_expired(now + Duration::minutes(29), Duration::zero()));
        assert!(!r.is_expired(now + Duration::minutes(30), Duration::zero()));
        assert!(r.is_expired(now + Duration::minutes(31), Duration::zero()));
        assert!(!r.is_expired(now + Duration::minutes(31), Duration::minutes(5)));
    }

    #[test]
    fn bound_session_suspends_expiry() {
        let now = Utc::now();
        let mut r = reservation(now);
        r.bind_session("S-1".into());
        assert!(!r.is_expired(now + Duration::hours(5), Duration::zero()));
        assert_eq!(r.state(now + Duration::hours(5), Duration::zero()), ReservationState::InUse);
    }

    #[test]
    fn state_transitions() {
        let now = Utc::now();
        let mut r = reservation(now);
        assert_eq!(r.state(now, Duration::zero()), ReservationState::Active);
        assert_eq!(
            r.state(now + Duration::hours(1), Duration::zero()),
            ReservationState::Expired
        );

        r.release(ReleaseReason::Cancelled, now);
        r.release(ReleaseReason::Expired, now + Duration::hours(1));
        assert_eq!(r.state(now, Duration::zero()), ReservationState::Released);
        assert_eq!(r.release_reason(), Some(ReleaseReason::Cancelled));
        assert_eq!(r.released_at(), Some(now));
    }

    #[test]
    fn time_left_clamps_to_zero() {
        let now = Utc::now();
        let r = reservation(now);
        assert_eq!(r.time_left(now + Duration::minutes(10)), Duration::minutes(20));
        assert_eq!(r.time_left(now + Duration::hours(2)), Duration::zero());
    }

    #[test]
    fn consumed_time_is_capped_while_session_bound() {
        let now = Utc::now();
        let mut r = reservation(now);
        r.bind_session("S-1".into());
        r.add_consumed_time(Duration::minutes(8), now + Duration::minutes(5));
        assert_eq!(r.consumed_time(), Duration::minutes(5));

        r.add_consumed_time(Duration::minutes(-3), now + Duration::minutes(6));
        assert_eq!(r.consumed_time(), Duration::minutes(5));
    }

    #[test]
    fn negative_duration_is_clamped() {
        let now = Utc::now();
        let request = ReserveRequest::new("CP", ResourceLevel::ChargePoint, now, Duration::minutes(-5));
        let r = Reservation::new("R2".into(), path(), request, now);
        assert_eq!(r.duration(), Duration::zero());
        assert_eq!(r.end_time(), now);
    }

    #[test]
    fn unrepresentable_end_time_is_clamped() {
        let now = Utc::now();
        let request = ReserveRequest::new("CP", ResourceLevel::ChargePoint, now, Duration::MAX);
        assert_eq!(request.end_time(), None);

        let r = Reservation::new("R3".into(), path(), request, now);
        assert_eq!(r.end_time(), DateTime::<Utc>::MAX_UTC);
        assert!(!r.is_expired(now + Duration::days(365), Duration::MAX));
    }

    #[test]
    fn authorization_sets() {
        let now = Utc::now();
        let r = reservation(now);
        assert!(r.authorizes_token("TAG-001"));
        assert!(!r.authorizes_token("TAG-999"));
        assert!(r.authorizes_pin("1234"));
        assert!(r.authorizes_account("anyone"));
    }
}
