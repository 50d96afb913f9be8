//! Status propagation, reports and diffs over a resource tree.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};

use texnouz_roaming::application::diff::STATUS_REPORT_CONTEXT;
use texnouz_roaming::domain::{StatusChange, StatusUpdate};
use texnouz_roaming::{
    AvailabilityStatus, NetworkOptions, ResourceId, ResourceLevel, RoamingNetwork, StatusDiff,
};

use AvailabilityStatus::*;

fn id(s: &str) -> ResourceId {
    ResourceId::from(s)
}

/// Operator → pool → one station with `n` charge points E1..En
fn network_with_charge_points(n: usize) -> RoamingNetwork {
    let network = RoamingNetwork::new("DE*GEF", "GraphDefined", NetworkOptions::default());
    let tree = network.tree();
    tree.add_operator("DE*GEF").unwrap();
    tree.add_pool("P1", &id("DE*GEF")).unwrap();
    tree.add_station("S1", &id("P1")).unwrap();
    for i in 1..=n {
        tree.add_charge_point(format!("E{i}"), &id("S1")).unwrap();
    }
    network
}

#[test]
fn seven_available_three_charging_report() {
    let network = network_with_charge_points(10);
    let now = Utc::now();
    for i in 1..=10 {
        let status = if i <= 7 { Available } else { Charging };
        network.tree().set_status(&id(&format!("E{i}")), status, now).unwrap();
    }

    let report = network.status_report(Some(ResourceLevel::ChargePoint));
    let json = serde_json::to_value(report.render()).unwrap();

    assert_eq!(
        json,
        serde_json::json!({
            "@context": STATUS_REPORT_CONTEXT,
            "count": 10,
            "report": {
                "Available": { "count": 7, "percentage": 70.0 },
                "Charging": { "count": 3, "percentage": 30.0 }
            }
        })
    );
    assert_eq!(
        report.to_string(),
        "10 entities; Available: 7 (70.00), Charging: 3 (30.00)"
    );

    // 7 vs 3 rolls up as Available all the way to the operator
    for parent in ["S1", "P1", "DE*GEF"] {
        assert_eq!(*network.tree().status(&id(parent)).unwrap().value(), Available);
    }
}

#[test]
fn parent_follows_plurality_and_is_idempotent() {
    let network = network_with_charge_points(5);
    let tree = network.tree();
    let now = Utc::now();

    let statuses = [Charging, Charging, Error, Error, Available];
    for (i, status) in statuses.into_iter().enumerate() {
        tree.set_status(&id(&format!("E{}", i + 1)), status, now).unwrap();
    }
    // Charging and Error tie at 2; Charging has the lower ordinal
    assert_eq!(*tree.status(&id("S1")).unwrap().value(), Charging);

    let history = tree.status_history(&id("S1")).unwrap().len();
    assert!(!tree.recompute(&id("S1")).unwrap().is_changed());
    assert_eq!(tree.recompute_all(), 0);
    assert_eq!(tree.status_history(&id("S1")).unwrap().len(), history);
}

#[test]
fn history_is_newest_first_and_non_increasing() {
    let network = network_with_charge_points(1);
    let tree = network.tree();
    let start = Utc::now();

    let writes = [
        (Available, 1),
        (Charging, 2),
        (Charging, 3),
        (Available, 0), // stale
        (Error, 5),
    ];
    let mut last_accepted = Unknown;
    for (status, offset) in writes {
        let update = tree
            .set_status(&id("E1"), status, start + Duration::seconds(offset))
            .unwrap();
        if update != StatusUpdate::Stale {
            last_accepted = status;
        }
        assert_eq!(*tree.status(&id("E1")).unwrap().value(), last_accepted);
    }

    let history = tree.status_history(&id("E1")).unwrap();
    assert!(history
        .windows(2)
        .all(|pair| pair[0].timestamp() >= pair[1].timestamp()));
    assert_eq!(*history[0].value(), Error);
}

#[test]
fn observers_receive_old_and_new_in_order() {
    let network = network_with_charge_points(2);
    let tree = network.tree();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    tree.subscribe(
        &id("S1"),
        Arc::new(move |change: &StatusChange<AvailabilityStatus>| {
            sink.lock().unwrap().push((change.old, change.new));
        }),
    )
    .unwrap();

    let now = Utc::now();
    tree.set_status(&id("E1"), Available, now).unwrap();
    tree.set_status(&id("E2"), Available, now).unwrap();
    tree.set_status(&id("E1"), Charging, now + Duration::seconds(1)).unwrap();
    tree.set_status(&id("E2"), Charging, now + Duration::seconds(2)).unwrap();

    // Ties resolve to Available, so S1 only moves twice
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(Unknown, Available), (Available, Charging)]
    );
}

#[test]
fn diff_buckets_account_for_every_add() {
    let network = network_with_charge_points(4);
    let tree = network.tree();
    let now = Utc::now();

    let mut sync = network.synchronizer();
    let initial = tree.snapshot(Some(ResourceLevel::ChargePoint));
    let diff = sync.diff_snapshot(&initial, now);
    assert_eq!(diff.short_info(), "4/0/0");
    sync.commit(&diff);

    tree.set_status(&id("E1"), Charging, now).unwrap();
    tree.remove_resource(&id("E4")).unwrap();
    tree.add_charge_point("E5", &id("S1")).unwrap();

    let diff = sync.diff_snapshot(&tree.snapshot(Some(ResourceLevel::ChargePoint)), now);
    assert_eq!(diff.short_info(), "1/1/1");
    assert_eq!(diff.len(), 3);
    assert!(diff.new_entries().contains_key(&id("E5")));
    assert_eq!(diff.changed_entries().get(&id("E1")), Some(&Charging));
    assert!(diff.removed_ids().contains(&id("E4")));

    let report = diff.report();
    assert_eq!(report.count(), 2);
    assert!(diff.extended_info().contains("E1: Charging"));
}

#[test]
fn manual_diff_counts_match_add_calls() {
    let mut diff: StatusDiff<ResourceId, AvailabilityStatus> =
        StatusDiff::new("DE*GEF", "GraphDefined", Utc::now());
    let mut adds = 0;

    for i in 0..5 {
        diff.add_new(id(&format!("N{i}")), Available);
        adds += 1;
    }
    for i in 0..3 {
        diff.add_changed(id(&format!("C{i}")), Charging);
        adds += 1;
    }
    diff.add_removed_many((0..2).map(|i| id(&format!("R{i}"))));
    adds += 2;

    assert_eq!(
        diff.new_entries().len() + diff.changed_entries().len() + diff.removed_ids().len(),
        adds
    );
    assert_eq!(diff.short_info(), "5/3/2");
}

#[test]
fn status_diff_against_previous_snapshot() {
    let network = network_with_charge_points(3);
    let previous: BTreeMap<ResourceId, AvailabilityStatus> =
        network.tree().snapshot(Some(ResourceLevel::ChargePoint));

    network.tree().set_status(&id("E2"), Reserved, Utc::now()).unwrap();

    let diff = network.status_diff(&previous, Some(ResourceLevel::ChargePoint));
    assert_eq!(diff.short_info(), "0/1/0");
    assert_eq!(diff.to_string(), "GraphDefined: 0/1/0");
}

#[tokio::test]
async fn status_changes_reach_the_event_bus() {
    let network = network_with_charge_points(1);
    let mut events = network.event_bus().subscribe();

    network.tree().set_status(&id("E1"), Charging, Utc::now()).unwrap();

    let mut changed = Vec::new();
    while let Some(message) = events.try_recv() {
        assert_eq!(message.event.event_type(), "status_changed");
        changed.push(message.event.resource_id().clone());
    }
    assert_eq!(changed, vec![id("E1"), id("S1"), id("P1"), id("DE*GEF")]);
}
