// libs/notification-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload handed to the downstream notification pipeline when a booking
/// reaches confirmed. Channel selection (email/SMS) happens downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfirmedNotice {
    pub booking_id: Uuid,
    pub patient_id: Uuid,
    pub specialist_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
}
