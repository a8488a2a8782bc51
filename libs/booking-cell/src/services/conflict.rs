// libs/booking-cell/src/services/conflict.rs
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{Booking, BookingError};

/// Two bookings overlap iff start1 < end2 AND start2 < end1. The intervals
/// are half-open, so back-to-back bookings do not conflict.
pub fn intervals_overlap(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && start2 < end1
}

pub struct BookingConflictService {
    supabase: Arc<SupabaseClient>,
}

impl BookingConflictService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Find pending/confirmed bookings for a specialist whose intervals
    /// overlap [start_time, end_time), optionally excluding one booking
    /// (the one being rescheduled).
    pub async fn find_conflicts(
        &self,
        specialist_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_booking_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Booking>, BookingError> {
        debug!(
            "Checking booking conflicts for specialist {} from {} to {}",
            specialist_id, start_time, end_time
        );

        let candidates = self
            .get_blocking_bookings(specialist_id, end_time, exclude_booking_id, auth_token)
            .await?;

        let conflicts: Vec<Booking> = candidates
            .into_iter()
            .filter(|booking| booking.status.is_blocking())
            .filter(|booking| {
                intervals_overlap(start_time, end_time, booking.start_time, booking.end_time())
            })
            .collect();

        if !conflicts.is_empty() {
            warn!(
                "Conflict detected for specialist {} - {} overlapping bookings",
                specialist_id,
                conflicts.len()
            );
        }

        Ok(conflicts)
    }

    /// Blocking bookings that start before `end_time`. The end-side bound
    /// is applied in memory since the stored row has no end column.
    async fn get_blocking_bookings(
        &self,
        specialist_id: Uuid,
        end_time: DateTime<Utc>,
        exclude_booking_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Booking>, BookingError> {
        let mut query_parts = vec![
            format!("specialist_id=eq.{}", specialist_id),
            "status=in.(pending,confirmed)".to_string(),
            format!(
                "start_time=lt.{}",
                urlencoding::encode(&end_time.to_rfc3339())
            ),
        ];

        if let Some(exclude_id) = exclude_booking_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        let path = format!(
            "/rest/v1/bookings?{}&order=start_time.asc",
            query_parts.join("&")
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| serde_json::from_value(row))
            .collect::<Result<Vec<Booking>, _>>()
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse bookings: {}", e)))
    }
}
