//! Reservation store
//!
//! Allocation (`reserve`) runs under one store-wide lock so the
//! precondition checks and the insert are atomic. Each reservation has
//! its own mutex shared by `bind_session`, `cancel` and `sweep`, so a
//! bind and an expiry sweep on the same reservation never interleave.
//!
//! Released reservations stay readable for the retention window, then
//! the sweep evicts them. Evicted ids are remembered in a bounded set so
//! caller-chosen ids are not reused while it holds them.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::application::events::{
    Event, ReservationCreatedEvent, ReservationReleasedEvent, ReservationSessionBoundEvent,
    SharedEventBus,
};
use crate::domain::error::{ReservationFailure, ReservationResult};
use crate::domain::ports::{Clock, ReservationIdGenerator, ResourceLookup, SystemClock, UuidReservationIds};
use crate::domain::reservation::{ReleaseReason, ReserveRequest, Reservation, ReservationId, SessionId};
use crate::domain::resource::{ResourceId, ResourceLevel, ResourcePath};
use crate::shared::lock;

type SharedReservation = Arc<Mutex<Reservation>>;

/// Attempts before giving up on generated id collisions
const MAX_ID_ATTEMPTS: usize = 8;

/// Evicted ids remembered for collision checks
pub const DEFAULT_TOMBSTONE_CAPACITY: usize = 65_536;

/// Ids of evicted reservations, oldest dropped first
#[derive(Debug)]
struct Tombstones {
    ids: HashSet<ReservationId>,
    order: VecDeque<ReservationId>,
    capacity: usize,
}

impl Tombstones {
    fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn contains(&self, id: &ReservationId) -> bool {
        self.ids.contains(id)
    }

    fn insert(&mut self, id: ReservationId) {
        if self.capacity == 0 || !self.ids.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

pub struct ReservationStore {
    reservations: DashMap<ReservationId, SharedReservation>,
    tombstones: Mutex<Tombstones>,
    retention: Duration,
    allocation: Mutex<()>,
    resources: Arc<dyn ResourceLookup>,
    ids: Arc<dyn ReservationIdGenerator>,
    clock: Arc<dyn Clock>,
    grace: Duration,
    event_bus: Option<SharedEventBus>,
}

impl ReservationStore {
    pub fn new(resources: Arc<dyn ResourceLookup>) -> Self {
        Self {
            reservations: DashMap::new(),
            tombstones: Mutex::new(Tombstones::new(DEFAULT_TOMBSTONE_CAPACITY)),
            retention: Duration::hours(1),
            allocation: Mutex::new(()),
            resources,
            ids: Arc::new(UuidReservationIds),
            clock: Arc::new(SystemClock),
            grace: Duration::zero(),
            event_bus: None,
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn ReservationIdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Extra time after `end_time` before a reservation counts as expired
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace.max(Duration::zero());
        self
    }

    /// How long a released reservation stays readable before `sweep`
    /// evicts it
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention.max(Duration::zero());
        self
    }

    /// Number of evicted ids remembered for collision checks
    pub fn with_tombstone_capacity(mut self, capacity: usize) -> Self {
        self.tombstones = Mutex::new(Tombstones::new(capacity));
        self
    }

    pub fn with_event_bus(mut self, event_bus: SharedEventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn grace_period(&self) -> Duration {
        self.grace
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ── Allocation ─────────────────────────────────────────────

    /// Checks, in order: the resource exists at the requested level, it
    /// is not out of service, no active reservation overlaps it, and it
    /// is not charging (unless `allow_in_use`).
    pub fn reserve(&self, request: ReserveRequest) -> ReservationResult<Reservation> {
        let resource_id = request.resource_id.clone();
        let result = self.try_reserve(request);

        match &result {
            Ok(reservation) => {
                metrics::counter!("reservations_created_total").increment(1);
                info!(
                    reservation_id = %reservation.id(),
                    resource_id = %resource_id,
                    level = %reservation.level(),
                    start = %reservation.start_time(),
                    end = %reservation.end_time(),
                    "Reservation created"
                );
            }
            Err(failure) => {
                metrics::counter!("reservation_failures_total", "kind" => failure.kind()).increment(1);
                debug!(resource_id = %resource_id, error = %failure, "Reservation rejected");
            }
        }
        result
    }

    fn try_reserve(&self, request: ReserveRequest) -> ReservationResult<Reservation> {
        let _allocation = lock(&self.allocation);
        let now = self.clock.now();
        let resource_id = request.resource_id.clone();

        let path = self
            .resources
            .resolve_path(&resource_id, request.level)
            .ok_or_else(|| ReservationFailure::UnknownResource(resource_id.clone()))?;

        let status = self.resources.current_status(&resource_id);
        let admin_status = self.resources.current_admin_status(&resource_id);
        if status.is_some_and(|s| s.is_out_of_service())
            || admin_status.is_some_and(|s| s.is_out_of_service())
        {
            return Err(ReservationFailure::ResourceOutOfService(resource_id));
        }

        if let Some(existing) = self.find_overlapping(&path, now) {
            return Err(ReservationFailure::ResourceAlreadyReserved {
                resource_id,
                reservation_id: existing,
            });
        }

        if !request.allow_in_use && status.is_some_and(|s| s.is_in_use()) {
            return Err(ReservationFailure::ResourceAlreadyInUse(resource_id));
        }

        if request.end_time().is_none() {
            return Err(ReservationFailure::Error(format!(
                "reservation duration {} is out of range",
                request.duration
            )));
        }

        let id = match request.reservation_id.clone() {
            Some(id) if self.is_taken(&id) => {
                return Err(ReservationFailure::ReservationIdAlreadyInUse(id));
            }
            Some(id) => id,
            None => self.generate_id()?,
        };

        let reservation = Reservation::new(id.clone(), path, request, now);
        self.reservations
            .insert(id, Arc::new(Mutex::new(reservation.clone())));

        self.publish(Event::ReservationCreated(ReservationCreatedEvent {
            reservation_id: reservation.id().clone(),
            resource_id: reservation.resource_id().clone(),
            level: reservation.level(),
            start_time: reservation.start_time(),
            end_time: reservation.end_time(),
            provider_id: reservation.provider_id().map(str::to_string),
            timestamp: now,
        }));
        Ok(reservation)
    }

    /// First active reservation whose path overlaps `path`
    fn find_overlapping(&self, path: &ResourcePath, now: DateTime<Utc>) -> Option<ReservationId> {
        let mut overlapping: Vec<ReservationId> = self
            .shared_reservations()
            .iter()
            .filter_map(|shared| {
                let reservation = lock(shared);
                (reservation.is_active(now, self.grace) && reservation.path().overlaps(path))
                    .then(|| reservation.id().clone())
            })
            .collect();
        overlapping.sort();
        overlapping.into_iter().next()
    }

    fn generate_id(&self) -> ReservationResult<ReservationId> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.ids.next_id();
            if !self.is_taken(&id) {
                return Ok(id);
            }
            warn!(reservation_id = %id, "Generated reservation id already taken, retrying");
        }
        Err(ReservationFailure::Error(
            "could not generate a unique reservation id".to_string(),
        ))
    }

    /// Stored, or evicted recently enough to still be remembered
    fn is_taken(&self, id: &ReservationId) -> bool {
        self.reservations.contains_key(id) || lock(&self.tombstones).contains(id)
    }

    // ── Lifecycle ──────────────────────────────────────────────

    /// Releases the reservation. Cancelling an already released
    /// reservation succeeds without effect.
    pub fn cancel(&self, id: &ReservationId) -> ReservationResult<()> {
        let shared = self.shared(id)?;
        let mut reservation = lock(&shared);

        if reservation.is_released() {
            debug!(reservation_id = %id, "Reservation already released");
            return Ok(());
        }

        let now = self.clock.now();
        reservation.release(ReleaseReason::Cancelled, now);
        info!(reservation_id = %id, resource_id = %reservation.resource_id(), "Reservation cancelled");
        self.released(&reservation, ReleaseReason::Cancelled, now);
        Ok(())
    }

    /// Binds a charging session; expiry checks stop from here on.
    ///
    /// Re-binding the same session is a no-op.
    pub fn bind_session(
        &self,
        id: &ReservationId,
        session_id: impl Into<SessionId>,
    ) -> ReservationResult<Reservation> {
        let session_id = session_id.into();
        let shared = self.shared(id)?;
        let mut reservation = lock(&shared);
        let now = self.clock.now();

        match reservation.release_reason() {
            Some(ReleaseReason::Expired) => {
                return Err(ReservationFailure::ReservationExpired(id.clone()));
            }
            Some(_) => return Err(ReservationFailure::UnknownReservation(id.clone())),
            None => {}
        }

        if let Some(bound) = reservation.bound_session() {
            if *bound == session_id {
                return Ok(reservation.clone());
            }
            return Err(ReservationFailure::ResourceAlreadyInUse(
                reservation.resource_id().clone(),
            ));
        }

        if reservation.is_expired(now, self.grace) {
            return Err(ReservationFailure::ReservationExpired(id.clone()));
        }

        reservation.bind_session(session_id.clone());
        info!(
            reservation_id = %id,
            resource_id = %reservation.resource_id(),
            session_id = %session_id,
            "Session bound to reservation"
        );
        self.publish(Event::ReservationSessionBound(ReservationSessionBoundEvent {
            reservation_id: id.clone(),
            resource_id: reservation.resource_id().clone(),
            session_id,
            timestamp: now,
        }));
        Ok(reservation.clone())
    }

    /// Adds to the consumed time. Returns the new total.
    pub fn add_consumed_time(&self, id: &ReservationId, delta: Duration) -> ReservationResult<Duration> {
        let shared = self.shared(id)?;
        let mut reservation = lock(&shared);
        if reservation.is_released() {
            return Err(ReservationFailure::UnknownReservation(id.clone()));
        }

        reservation.add_consumed_time(delta, self.clock.now());
        Ok(reservation.consumed_time())
    }

    /// Ends an in-use reservation once its session has completed.
    pub fn release_consumed(&self, id: &ReservationId) -> ReservationResult<Reservation> {
        let shared = self.shared(id)?;
        let mut reservation = lock(&shared);

        match reservation.release_reason() {
            Some(ReleaseReason::Consumed) => return Ok(reservation.clone()),
            Some(_) => return Err(ReservationFailure::UnknownReservation(id.clone())),
            None => {}
        }
        if !reservation.has_session() {
            return Err(ReservationFailure::Error(format!(
                "reservation {id} has no bound session"
            )));
        }

        let now = self.clock.now();
        reservation.release(ReleaseReason::Consumed, now);
        info!(
            reservation_id = %id,
            resource_id = %reservation.resource_id(),
            consumed_secs = reservation.consumed_time().num_seconds(),
            "Reservation consumed"
        );
        self.released(&reservation, ReleaseReason::Consumed, now);
        Ok(reservation.clone())
    }

    /// `grace_override` replaces the store's grace period for this check.
    pub fn is_expired(
        &self,
        reservation: &Reservation,
        now: DateTime<Utc>,
        grace_override: Option<Duration>,
    ) -> bool {
        reservation.is_expired(now, grace_override.unwrap_or(self.grace))
    }

    /// Releases every unbound reservation that has expired at `now`.
    /// Returns the reservations released by this pass.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<Reservation> {
        let mut released: Vec<Reservation> = self
            .shared_reservations()
            .iter()
            .filter_map(|shared| {
                let mut reservation = lock(shared);
                if reservation.is_released() || !reservation.is_expired(now, self.grace) {
                    return None;
                }
                reservation.release(ReleaseReason::Expired, now);
                debug!(
                    reservation_id = %reservation.id(),
                    resource_id = %reservation.resource_id(),
                    "Reservation expired"
                );
                self.released(&reservation, ReleaseReason::Expired, now);
                Some(reservation.clone())
            })
            .collect();

        if !released.is_empty() {
            info!(count = released.len(), "Released expired reservations");
        }
        self.evict_released(now);
        released.sort_by(|a, b| a.id().cmp(b.id()));
        released
    }

    /// Drops reservations released more than the retention window before
    /// `now`. Returns how many were evicted.
    pub fn evict_released(&self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = now.checked_sub_signed(self.retention) else {
            return 0;
        };

        let mut evicted = 0;
        for shared in self.shared_reservations() {
            let reservation = lock(&shared);
            if !reservation.released_at().is_some_and(|at| at < cutoff) {
                continue;
            }
            // Remembered before removal so the id never looks free
            lock(&self.tombstones).insert(reservation.id().clone());
            if self.reservations.remove(reservation.id()).is_some() {
                evicted += 1;
            }
        }

        if evicted > 0 {
            metrics::counter!("reservations_evicted_total").increment(evicted as u64);
            debug!(count = evicted, "Evicted released reservations");
        }
        evicted
    }

    /// `sweep` at the store clock's current time
    pub fn sweep_now(&self) -> Vec<Reservation> {
        self.sweep(self.clock.now())
    }

    // ── Lookup ─────────────────────────────────────────────────

    pub fn get(&self, id: &ReservationId) -> Option<Reservation> {
        self.shared(id).ok().map(|shared| lock(&shared).clone())
    }

    /// Active reservations covering the resource, including reservations
    /// on its ancestors and descendants
    pub fn active_for_resource(&self, id: &ResourceId, level: ResourceLevel) -> Vec<Reservation> {
        let now = self.clock.now();
        let path = self.resources.resolve_path(id, level);
        let mut active: Vec<Reservation> = self
            .shared_reservations()
            .iter()
            .filter_map(|shared| {
                let reservation = lock(shared);
                let covers = match &path {
                    Some(path) => reservation.path().overlaps(path),
                    None => reservation.path().contains(id),
                };
                (covers && reservation.is_active(now, self.grace)).then(|| reservation.clone())
            })
            .collect();
        active.sort_by(|a, b| a.id().cmp(b.id()));
        active
    }

    /// Every stored reservation, including released ones still within
    /// the retention window, oldest first
    pub fn all(&self) -> Vec<Reservation> {
        let mut all: Vec<Reservation> = self
            .shared_reservations()
            .iter()
            .map(|shared| lock(shared).clone())
            .collect();
        all.sort_by(|a, b| (a.created_at(), a.id()).cmp(&(b.created_at(), b.id())));
        all
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }

    /// Evicted ids still remembered for collision checks
    pub fn tombstone_count(&self) -> usize {
        lock(&self.tombstones).len()
    }

    fn shared(&self, id: &ReservationId) -> ReservationResult<SharedReservation> {
        self.reservations
            .get(id)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| ReservationFailure::UnknownReservation(id.clone()))
    }

    /// Snapshot of the map's values; no map guard is held afterwards
    fn shared_reservations(&self) -> Vec<SharedReservation> {
        self.reservations
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    fn released(&self, reservation: &Reservation, reason: ReleaseReason, at: DateTime<Utc>) {
        metrics::counter!("reservations_released_total", "reason" => reason.as_str()).increment(1);
        self.publish(Event::ReservationReleased(ReservationReleasedEvent {
            reservation_id: reservation.id().clone(),
            resource_id: reservation.resource_id().clone(),
            reason,
            timestamp: at,
        }));
    }

    fn publish(&self, event: Event) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}
