//! Reservation id generation

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::reservation::ReservationId;

/// Supplies fresh reservation ids. The store retries on collision.
pub trait ReservationIdGenerator: Send + Sync {
    fn next_id(&self) -> ReservationId;
}

/// Random v4 uuids
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidReservationIds;

impl ReservationIdGenerator for UuidReservationIds {
    fn next_id(&self) -> ReservationId {
        ReservationId::new(uuid::Uuid::new_v4().to_string())
    }
}

/// `<prefix>-1`, `<prefix>-2`, ...
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(1),
        }
    }
}

impl ReservationIdGenerator for SequentialIds {
    fn next_id(&self) -> ReservationId {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        ReservationId::new(format!("{}-{}", self.prefix, n))
    }
}
