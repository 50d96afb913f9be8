//! Notification events
//!
//! Defines all event types that can be broadcasted to subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::reservation::{ReleaseReason, ReservationId, SessionId};
use crate::domain::resource::{ResourceId, ResourceLevel};
use crate::domain::status::{AdminStatus, AvailabilityStatus};

/// Event types for notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    StatusChanged(StatusChangedEvent),
    AdminStatusChanged(AdminStatusChangedEvent),
    ReservationCreated(ReservationCreatedEvent),
    ReservationSessionBound(ReservationSessionBoundEvent),
    ReservationReleased(ReservationReleasedEvent),
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::StatusChanged(_) => "status_changed",
            Event::AdminStatusChanged(_) => "admin_status_changed",
            Event::ReservationCreated(_) => "reservation_created",
            Event::ReservationSessionBound(_) => "reservation_session_bound",
            Event::ReservationReleased(_) => "reservation_released",
        }
    }

    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Event::StatusChanged(e) => &e.resource_id,
            Event::AdminStatusChanged(e) => &e.resource_id,
            Event::ReservationCreated(e) => &e.resource_id,
            Event::ReservationSessionBound(e) => &e.resource_id,
            Event::ReservationReleased(e) => &e.resource_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangedEvent {
    pub resource_id: ResourceId,
    pub level: ResourceLevel,
    pub old_status: AvailabilityStatus,
    pub new_status: AvailabilityStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminStatusChangedEvent {
    pub resource_id: ResourceId,
    pub level: ResourceLevel,
    pub old_status: AdminStatus,
    pub new_status: AdminStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationCreatedEvent {
    pub reservation_id: ReservationId,
    pub resource_id: ResourceId,
    pub level: ResourceLevel,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub provider_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationSessionBoundEvent {
    pub reservation_id: ReservationId,
    pub resource_id: ResourceId,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationReleasedEvent {
    pub reservation_id: ReservationId,
    pub resource_id: ResourceId,
    pub reason: ReleaseReason,
    pub timestamp: DateTime<Utc>,
}

/// Wrapper for sending events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}
