//! End-to-end reservation scenarios against a small roaming network.

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, Utc};

use texnouz_roaming::domain::ports::{Clock, ManualClock, SequentialIds};
use texnouz_roaming::domain::{ReleaseReason, ReservationState};
use texnouz_roaming::{
    AvailabilityStatus, NetworkOptions, ReservationFailure, ReserveRequest, ResourceId,
    ResourceLevel, RoamingNetwork,
};

const CHARGE_POINT: &str = "DE*GEF*E1";

fn id(s: &str) -> ResourceId {
    ResourceId::from(s)
}

fn network(clock: Arc<ManualClock>) -> RoamingNetwork {
    let network = RoamingNetwork::new(
        "DE*GEF",
        "GraphDefined",
        NetworkOptions {
            clock,
            ids: Arc::new(SequentialIds::new("R")),
            ..NetworkOptions::default()
        },
    );

    let tree = network.tree();
    tree.add_operator("DE*GEF").unwrap();
    tree.add_pool("DE*GEF*P1", &id("DE*GEF")).unwrap();
    tree.add_station("DE*GEF*S1", &id("DE*GEF*P1")).unwrap();
    tree.add_charge_point(CHARGE_POINT, &id("DE*GEF*S1")).unwrap();
    tree.add_charge_point("DE*GEF*E2", &id("DE*GEF*S1")).unwrap();
    network
}

fn thirty_minutes(clock: &ManualClock, resource: &str) -> ReserveRequest {
    ReserveRequest::new(resource, ResourceLevel::ChargePoint, clock.now(), Duration::minutes(30))
}

#[test]
fn reserve_reject_sweep_reserve_again() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let network = network(clock.clone());
    let now = clock.now();

    let first = network.reserve(thirty_minutes(&clock, CHARGE_POINT)).unwrap();
    assert_eq!(first.end_time(), now + Duration::minutes(30));
    assert_eq!(first.resource_id(), &id(CHARGE_POINT));

    assert_eq!(
        network.reserve(thirty_minutes(&clock, CHARGE_POINT)),
        Err(ReservationFailure::ResourceAlreadyReserved {
            resource_id: id(CHARGE_POINT),
            reservation_id: first.id().clone(),
        })
    );

    let released = network.reservations().sweep(now + Duration::minutes(31));
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].id(), first.id());
    assert_eq!(released[0].release_reason(), Some(ReleaseReason::Expired));

    clock.advance(Duration::minutes(31));
    let second = network.reserve(thirty_minutes(&clock, CHARGE_POINT)).unwrap();
    assert_ne!(second.id(), first.id());
}

#[test]
fn expiry_boundary_at_thirty_minutes() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let network = network(clock.clone());
    let now = clock.now();
    let store = network.reservations();

    let r = network.reserve(thirty_minutes(&clock, CHARGE_POINT)).unwrap();

    assert!(!store.is_expired(&r, now + Duration::minutes(29), None));
    assert!(store.is_expired(&r, now + Duration::minutes(31), None));
    assert_eq!(r.time_left(now + Duration::minutes(31)), Duration::zero());
    assert_eq!(
        r.state(now + Duration::minutes(31), Duration::zero()),
        ReservationState::Expired
    );

    let bound = store.bind_session(r.id(), "SESSION-1").unwrap();
    assert!(!store.is_expired(&bound, now + Duration::minutes(31), None));
    assert!(!store.is_expired(&bound, now + Duration::hours(12), Some(Duration::zero())));
}

#[test]
fn cancel_is_idempotent_and_knows_unknown_ids() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let network = network(clock.clone());
    let store = network.reservations();

    let r = network.reserve(thirty_minutes(&clock, CHARGE_POINT)).unwrap();
    assert_eq!(store.cancel(r.id()), Ok(()));
    assert_eq!(store.cancel(r.id()), Ok(()));
    assert_eq!(
        store.cancel(&"does-not-exist".into()),
        Err(ReservationFailure::UnknownReservation("does-not-exist".into()))
    );
}

#[test]
fn concurrent_reserve_has_a_single_winner() {
    const CALLERS: usize = 16;

    for _ in 0..20 {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let network = network(clock.clone());
        let barrier = Barrier::new(CALLERS);

        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..CALLERS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        network.reserve(thirty_minutes(&clock, CHARGE_POINT))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results.iter().filter_map(|r| r.as_ref().err()).all(|e| matches!(
            e,
            ReservationFailure::ResourceAlreadyReserved { .. }
        )));
    }
}

#[test]
fn concurrent_reserve_across_levels_has_a_single_winner() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let network = network(clock.clone());
    let barrier = Barrier::new(2);

    let (station, charge_point) = thread::scope(|scope| {
        let station = scope.spawn(|| {
            barrier.wait();
            network.reserve(ReserveRequest::new(
                "DE*GEF*S1",
                ResourceLevel::Station,
                clock.now(),
                Duration::minutes(30),
            ))
        });
        let charge_point = scope.spawn(|| {
            barrier.wait();
            network.reserve(thirty_minutes(&clock, CHARGE_POINT))
        });
        (station.join().unwrap(), charge_point.join().unwrap())
    });

    assert!(station.is_ok() != charge_point.is_ok());
}

#[test]
fn sweep_racing_bind_never_releases_a_bound_reservation() {
    for _ in 0..50 {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let network = network(clock.clone());
        let store = network.reservations().clone();
        let r = network
            .reserve(ReserveRequest::new(
                CHARGE_POINT,
                ResourceLevel::ChargePoint,
                clock.now(),
                Duration::zero(),
            ))
            .unwrap();
        clock.advance(Duration::seconds(1));
        let barrier = Barrier::new(2);

        let (bound, swept) = thread::scope(|scope| {
            let bind = scope.spawn(|| {
                barrier.wait();
                store.bind_session(r.id(), "SESSION-1")
            });
            let sweep = scope.spawn(|| {
                barrier.wait();
                store.sweep_now()
            });
            (bind.join().unwrap(), sweep.join().unwrap())
        });

        // already expired: the bind must lose whichever thread ran first
        assert_eq!(bound, Err(ReservationFailure::ReservationExpired(r.id().clone())));
        let stored = store.get(r.id()).unwrap();
        assert!(stored.bound_session().is_none());
        assert!(swept.len() <= 1);
    }
}

#[test]
fn bind_before_expiry_survives_sweeps() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let network = network(clock.clone());
    let store = network.reservations();

    let r = network.reserve(thirty_minutes(&clock, CHARGE_POINT)).unwrap();
    clock.advance(Duration::minutes(10));
    store.bind_session(r.id(), "SESSION-1").unwrap();
    store.add_consumed_time(r.id(), Duration::minutes(10)).unwrap();

    clock.advance(Duration::hours(1));
    assert!(store.sweep_now().is_empty());
    assert_eq!(
        store.get(r.id()).unwrap().state(clock.now(), Duration::zero()),
        ReservationState::InUse
    );

    // still blocks the charge point while in use
    assert!(matches!(
        network.reserve(thirty_minutes(&clock, CHARGE_POINT)),
        Err(ReservationFailure::ResourceAlreadyReserved { .. })
    ));

    store.release_consumed(r.id()).unwrap();
    assert!(network.reserve(thirty_minutes(&clock, CHARGE_POINT)).is_ok());
}

#[test]
fn preconditions_short_circuit_in_order() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let network = network(clock.clone());
    let tree = network.tree();

    assert_eq!(
        network.reserve(thirty_minutes(&clock, "DE*GEF*E9")),
        Err(ReservationFailure::UnknownResource(id("DE*GEF*E9")))
    );

    tree.set_status(&id("DE*GEF*E2"), AvailabilityStatus::Charging, clock.now())
        .unwrap();
    assert_eq!(
        network.reserve(thirty_minutes(&clock, "DE*GEF*E2")),
        Err(ReservationFailure::ResourceAlreadyInUse(id("DE*GEF*E2")))
    );

    tree.set_status(
        &id("DE*GEF*E2"),
        AvailabilityStatus::OutOfService,
        clock.now() + Duration::seconds(1),
    )
    .unwrap();
    assert_eq!(
        network.reserve(thirty_minutes(&clock, "DE*GEF*E2")),
        Err(ReservationFailure::ResourceOutOfService(id("DE*GEF*E2")))
    );
    assert!(!ReservationFailure::ResourceOutOfService(id("DE*GEF*E2")).is_retryable());
}

#[test]
fn status_observed_before_registration_still_counts() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let network = network(clock.clone());

    let observed = clock.now() - Duration::seconds(1);
    network
        .tree()
        .set_status(&id("DE*GEF*E2"), AvailabilityStatus::Charging, observed)
        .unwrap();

    assert_eq!(
        network.reserve(thirty_minutes(&clock, "DE*GEF*E2")),
        Err(ReservationFailure::ResourceAlreadyInUse(id("DE*GEF*E2")))
    );
}

#[test]
fn released_reservations_are_evicted_after_retention() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let network = RoamingNetwork::new(
        "DE*GEF",
        "GraphDefined",
        NetworkOptions {
            clock: clock.clone(),
            retention: Duration::minutes(5),
            ..NetworkOptions::default()
        },
    );
    let tree = network.tree();
    tree.add_operator("DE*GEF").unwrap();
    tree.add_pool("DE*GEF*P1", &id("DE*GEF")).unwrap();
    let store = network.reservations();

    for _ in 0..10 {
        let r = network
            .reserve(ReserveRequest::new(
                "DE*GEF*P1",
                ResourceLevel::Pool,
                clock.now(),
                Duration::minutes(1),
            ))
            .unwrap();
        store.cancel(r.id()).unwrap();
    }
    assert_eq!(store.len(), 10);

    clock.advance(Duration::minutes(6));
    store.sweep_now();
    assert!(store.is_empty());
    assert_eq!(store.tombstone_count(), 10);
}
