//! Roaming network: wires the resource tree, reservation store and
//! event bus together

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::application::diff::{StatusDiff, StatusReport, StatusSynchronizer};
use crate::application::events::{create_event_bus, SharedEventBus, DEFAULT_CAPACITY};
use crate::application::reservations::{start_reservation_sweep_task, ReservationStore};
use crate::application::tree::ResourceTree;
use crate::config::AppConfig;
use crate::domain::aggregation::{StatusAggregator, TieBreak};
use crate::domain::error::ReservationResult;
use crate::domain::ports::{Clock, ReservationIdGenerator, SystemClock, UuidReservationIds};
use crate::domain::reservation::{ReserveRequest, Reservation};
use crate::domain::resource::{ResourceId, ResourceLevel};
use crate::domain::status::{AvailabilityStatus, HistoryLimits};
use crate::shared::shutdown::ShutdownSignal;

/// Options for building a [`RoamingNetwork`]
#[derive(Clone)]
pub struct NetworkOptions {
    pub history_limits: HistoryLimits,
    pub tie_break: TieBreak<AvailabilityStatus>,
    pub grace_period: Duration,
    /// How long released reservations stay readable before the sweep evicts them
    pub retention: Duration,
    /// Duration used by [`RoamingNetwork::reserve_request`]
    pub default_duration: Duration,
    pub bus_capacity: usize,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn ReservationIdGenerator>,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            history_limits: HistoryLimits::default(),
            tie_break: TieBreak::Ordinal,
            grace_period: Duration::zero(),
            retention: Duration::hours(1),
            default_duration: Duration::minutes(15),
            bus_capacity: DEFAULT_CAPACITY,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidReservationIds),
        }
    }
}

impl From<&AppConfig> for NetworkOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            history_limits: config.status.history_limits(),
            tie_break: config.aggregation.tie_break(),
            grace_period: config.reservations.grace_period(),
            retention: config.reservations.retention(),
            default_duration: config.reservations.default_duration(),
            bus_capacity: config.events.bus_capacity.max(1),
            ..Self::default()
        }
    }
}

pub struct RoamingNetwork {
    id: String,
    label: String,
    tree: Arc<ResourceTree>,
    reservations: Arc<ReservationStore>,
    event_bus: SharedEventBus,
    clock: Arc<dyn Clock>,
    default_duration: Duration,
}

impl RoamingNetwork {
    pub fn new(id: impl Into<String>, label: impl Into<String>, options: NetworkOptions) -> Self {
        let id = id.into();
        let event_bus = create_event_bus(options.bus_capacity);

        let tree = Arc::new(
            ResourceTree::new(
                options.history_limits,
                StatusAggregator::majority(options.tie_break.clone()),
            )
            .with_clock(options.clock.clone())
            .with_event_bus(event_bus.clone()),
        );

        let reservations = Arc::new(
            ReservationStore::new(tree.clone())
                .with_clock(options.clock.clone())
                .with_id_generator(options.ids.clone())
                .with_grace_period(options.grace_period)
                .with_retention(options.retention)
                .with_event_bus(event_bus.clone()),
        );

        info!(
            network_id = %id,
            tie_break = ?options.tie_break,
            grace_secs = options.grace_period.num_seconds(),
            "Roaming network created"
        );

        Self {
            id,
            label: label.into(),
            tree,
            reservations,
            event_bus,
            clock: options.clock,
            default_duration: options.default_duration,
        }
    }

    pub fn from_config(id: impl Into<String>, label: impl Into<String>, config: &AppConfig) -> Self {
        Self::new(id, label, NetworkOptions::from(config))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn tree(&self) -> &Arc<ResourceTree> {
        &self.tree
    }

    pub fn reservations(&self) -> &Arc<ReservationStore> {
        &self.reservations
    }

    pub fn event_bus(&self) -> &SharedEventBus {
        &self.event_bus
    }

    /// Request starting now for the configured default duration
    pub fn reserve_request(&self, resource_id: impl Into<ResourceId>, level: ResourceLevel) -> ReserveRequest {
        ReserveRequest::new(resource_id, level, self.clock.now(), self.default_duration)
    }

    pub fn reserve(&self, request: ReserveRequest) -> ReservationResult<Reservation> {
        self.reservations.reserve(request)
    }

    /// Distribution of current statuses, optionally at one level only
    pub fn status_report(&self, level: Option<ResourceLevel>) -> StatusReport<AvailabilityStatus> {
        StatusReport::from_statuses(self.tree.snapshot(level).into_values())
    }

    /// Diff from `previous` to the tree's current statuses at `level`
    pub fn status_diff(
        &self,
        previous: &BTreeMap<ResourceId, AvailabilityStatus>,
        level: Option<ResourceLevel>,
    ) -> StatusDiff<ResourceId, AvailabilityStatus> {
        StatusDiff::between(
            self.id.clone(),
            self.label.clone(),
            self.clock.now(),
            previous,
            &self.tree.snapshot(level),
        )
    }

    /// A synchronizer owned by this network, starting from an empty
    /// transmitted state
    pub fn synchronizer(&self) -> StatusSynchronizer<ResourceId, AvailabilityStatus> {
        StatusSynchronizer::new(self.id.clone(), self.label.clone())
    }

    pub fn start_sweep_task(&self, shutdown: ShutdownSignal, interval: std::time::Duration) -> JoinHandle<()> {
        start_reservation_sweep_task(self.reservations.clone(), shutdown, interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{ManualClock, SequentialIds};
    use chrono::Utc;

    fn network(clock: Arc<ManualClock>) -> RoamingNetwork {
        let options = NetworkOptions {
            clock,
            ids: Arc::new(SequentialIds::new("R")),
            ..NetworkOptions::default()
        };
        let network = RoamingNetwork::new("DE*GEF", "GraphDefined", options);
        let tree = network.tree();
        tree.add_operator("DE*GEF").unwrap();
        tree.add_pool("P1", &"DE*GEF".into()).unwrap();
        tree.add_station("S1", &"P1".into()).unwrap();
        tree.add_charge_point("DE*GEF*E1", &"S1".into()).unwrap();
        tree.add_charge_point("DE*GEF*E2", &"S1".into()).unwrap();
        network
    }

    #[test]
    fn reserve_request_uses_default_duration() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let network = network(clock.clone());

        let r = network
            .reserve(network.reserve_request("DE*GEF*E1", ResourceLevel::ChargePoint))
            .unwrap();
        assert_eq!(r.start_time(), clock.now());
        assert_eq!(r.end_time(), clock.now() + Duration::minutes(15));
        assert_eq!(r.id().as_str(), "R-1");
    }

    #[test]
    fn report_and_diff_follow_the_tree() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let network = network(clock.clone());
        let now = Utc::now();
        network
            .tree()
            .set_status(&"DE*GEF*E1".into(), AvailabilityStatus::Available, now)
            .unwrap();

        let report = network.status_report(Some(ResourceLevel::ChargePoint));
        assert_eq!(report.count(), 2);
        assert_eq!(report.count_of(&AvailabilityStatus::Available), 1);

        let diff = network.status_diff(&BTreeMap::new(), Some(ResourceLevel::ChargePoint));
        assert_eq!(diff.short_info(), "2/0/0");
        assert_eq!(diff.owner_id(), "DE*GEF");
    }

    #[test]
    fn options_follow_config() {
        let mut config = AppConfig::default();
        config.reservations.default_duration_secs = 60;
        config.reservations.grace_period_secs = 30;

        let options = NetworkOptions::from(&config);
        assert_eq!(options.default_duration, Duration::minutes(1));
        assert_eq!(options.grace_period, Duration::seconds(30));

        let network = RoamingNetwork::from_config("N", "Net", &config);
        assert_eq!(network.reservations().grace_period(), Duration::seconds(30));
    }
}
