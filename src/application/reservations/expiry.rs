//! Background task that periodically releases expired reservations.
//!
//! Runs in a tokio::spawn loop and calls [`ReservationStore::sweep_now`]
//! on every tick until the shutdown signal fires.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info};

use super::store::ReservationStore;
use crate::shared::shutdown::ShutdownSignal;

/// Start the reservation sweep background task.
pub fn start_reservation_sweep_task(
    store: Arc<ReservationStore>,
    shutdown: ShutdownSignal,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_ms = interval.as_millis() as u64,
            "📅 Reservation sweep task started"
        );

        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let released = store.sweep_now();
                    debug!(released = released.len(), "Reservation sweep finished");
                }
                _ = shutdown.notified().wait() => {
                    info!("📅 Reservation sweep task shutting down");
                    break;
                }
            }
        }

        info!("📅 Reservation sweep task stopped");
    })
}
