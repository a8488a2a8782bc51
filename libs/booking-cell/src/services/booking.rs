// libs/booking-cell/src/services/booking.rs
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use notification_cell::models::BookingConfirmedNotice;
use notification_cell::services::dispatch::NotificationDispatcher;
use shared_config::AppConfig;
use shared_database::supabase::{DbError, SupabaseClient};
use specialist_cell::models::SpecialistError;
use specialist_cell::services::profile::SpecialistProfileService;

use crate::models::{
    Booking, BookingError, BookingSearchQuery, BookingStatus, BookingValidationRules,
    CreateBookingRequest, UpdateBookingRequest,
};
use crate::services::conflict::BookingConflictService;
use crate::services::lifecycle::BookingLifecycle;

pub struct BookingService {
    supabase: Arc<SupabaseClient>,
    conflict_service: BookingConflictService,
    lifecycle: BookingLifecycle,
    profile_service: SpecialistProfileService,
    notifier: Arc<NotificationDispatcher>,
    validation_rules: BookingValidationRules,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let conflict_service = BookingConflictService::new(Arc::clone(&supabase));

        Self {
            conflict_service,
            lifecycle: BookingLifecycle::new(),
            profile_service: SpecialistProfileService::new(config),
            notifier: Arc::new(NotificationDispatcher::new(config)),
            supabase,
            validation_rules: BookingValidationRules::default(),
        }
    }

    /// Create a booking in pending state.
    ///
    /// The overlap re-check here closes the window between slot computation
    /// and submission; the bookings table's range exclusion constraint over
    /// pending/confirmed rows decides any race this check cannot see, and
    /// the losing insert comes back from the store as a conflict.
    pub async fn create_booking(
        &self,
        patient_id: Uuid,
        request: CreateBookingRequest,
        auth_token: &str,
    ) -> Result<Booking, BookingError> {
        info!(
            "Booking request: patient {} with specialist {} at {}",
            patient_id, request.specialist_id, request.start_time
        );

        self.validate_duration(request.duration_minutes)?;

        let specialist = self
            .profile_service
            .get_specialist(request.specialist_id, Some(auth_token))
            .await
            .map_err(|e| match e {
                SpecialistError::NotFound => BookingError::SpecialistNotFound,
                SpecialistError::DatabaseError(msg) => BookingError::DatabaseError(msg),
            })?;

        if !specialist.is_available {
            return Err(BookingError::SpecialistUnavailable);
        }

        let end_time =
            request.start_time + ChronoDuration::minutes(request.duration_minutes as i64);

        let conflicts = self
            .conflict_service
            .find_conflicts(
                request.specialist_id,
                request.start_time,
                end_time,
                None,
                auth_token,
            )
            .await?;
        if !conflicts.is_empty() {
            warn!(
                "Slot {} - {} already taken for specialist {}",
                request.start_time, end_time, request.specialist_id
            );
            return Err(BookingError::SlotUnavailable);
        }

        let now = Utc::now();
        let booking_data = json!({
            "patient_id": patient_id,
            "specialist_id": request.specialist_id,
            "start_time": request.start_time.to_rfc3339(),
            "duration_minutes": request.duration_minutes,
            "status": BookingStatus::Pending.to_string(),
            "patient_notes": request.patient_notes,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/bookings",
                Some(auth_token),
                Some(booking_data),
                Some(headers),
            )
            .await
            .map_err(|e| match e {
                // Exclusion constraint violation: a concurrent writer won.
                DbError::Conflict(_) => BookingError::SlotUnavailable,
                other => BookingError::DatabaseError(other.to_string()),
            })?;

        let booking = Self::parse_booking_row(result.into_iter().next())?;
        info!("Booking {} created in pending state", booking.id);

        Ok(booking)
    }

    /// Fetch a booking by id.
    pub async fn get_booking(
        &self,
        booking_id: Uuid,
        auth_token: &str,
    ) -> Result<Booking, BookingError> {
        debug!("Fetching booking: {}", booking_id);

        let path = format!("/rest/v1/bookings?id=eq.{}", booking_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(BookingError::NotFound);
        }

        Self::parse_booking_row(result.into_iter().next())
    }

    /// Search bookings with filters and pagination.
    pub async fn search_bookings(
        &self,
        query: BookingSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Booking>, BookingError> {
        debug!("Searching bookings with filters: {:?}", query);

        let mut query_parts = Vec::new();

        if let Some(patient_id) = query.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(specialist_id) = query.specialist_id {
            query_parts.push(format!("specialist_id=eq.{}", specialist_id));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(from_date) = query.from_date {
            query_parts.push(format!(
                "start_time=gte.{}",
                urlencoding::encode(&from_date.to_rfc3339())
            ));
        }
        if let Some(to_date) = query.to_date {
            query_parts.push(format!(
                "start_time=lte.{}",
                urlencoding::encode(&to_date.to_rfc3339())
            ));
        }

        let order = if query.ascending {
            "start_time.asc"
        } else {
            "start_time.desc"
        };
        let mut path = format!(
            "/rest/v1/bookings?{}&order={}",
            query_parts.join("&"),
            order
        );

        if let Some(limit) = query.limit {
            path.push_str(&format!("&limit={}", limit));
        }
        if let Some(offset) = query.offset {
            path.push_str(&format!("&offset={}", offset));
        }

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

    /// A patient's bookings, newest first.
    pub async fn list_for_patient(
        &self,
        patient_id: Uuid,
        status: Option<BookingStatus>,
        limit: Option<i32>,
        offset: Option<i32>,
        auth_token: &str,
    ) -> Result<Vec<Booking>, BookingError> {
        self.search_bookings(
            BookingSearchQuery {
                patient_id: Some(patient_id),
                specialist_id: None,
                status,
                from_date: None,
                to_date: None,
                limit,
                offset,
                ascending: false,
            },
            auth_token,
        )
        .await
    }

    /// A specialist's bookings, soonest first, optionally date-bounded.
    pub async fn list_for_specialist(
        &self,
        specialist_id: Uuid,
        status: Option<BookingStatus>,
        from_date: Option<DateTime<Utc>>,
        to_date: Option<DateTime<Utc>>,
        limit: Option<i32>,
        offset: Option<i32>,
        auth_token: &str,
    ) -> Result<Vec<Booking>, BookingError> {
        self.search_bookings(
            BookingSearchQuery {
                patient_id: None,
                specialist_id: Some(specialist_id),
                status,
                from_date,
                to_date,
                limit,
                offset,
                ascending: true,
            },
            auth_token,
        )
        .await
    }

    /// Update a booking. Start/duration changes re-validate the interval
    /// against other blocking bookings; a status change goes through the
    /// state machine. Terminal bookings only accept note updates.
    pub async fn update_booking(
        &self,
        booking_id: Uuid,
        request: UpdateBookingRequest,
        auth_token: &str,
    ) -> Result<Booking, BookingError> {
        debug!("Updating booking: {}", booking_id);

        let current = self.get_booking(booking_id, auth_token).await?;
        let rescheduling = request.start_time.is_some() || request.duration_minutes.is_some();

        if rescheduling && current.status.is_terminal() {
            return Err(BookingError::Validation(format!(
                "Cannot reschedule a {} booking",
                current.status
            )));
        }

        if let Some(new_status) = request.status {
            self.lifecycle.validate_transition(current.status, new_status)?;
        }

        if rescheduling {
            let new_start = request.start_time.unwrap_or(current.start_time);
            let new_duration = request.duration_minutes.unwrap_or(current.duration_minutes);
            self.validate_duration(new_duration)?;

            let new_end = new_start + ChronoDuration::minutes(new_duration as i64);
            let conflicts = self
                .conflict_service
                .find_conflicts(
                    current.specialist_id,
                    new_start,
                    new_end,
                    Some(booking_id),
                    auth_token,
                )
                .await?;
            if !conflicts.is_empty() {
                return Err(BookingError::SlotUnavailable);
            }
        }

        let mut update_data = serde_json::Map::new();
        if let Some(start_time) = request.start_time {
            update_data.insert("start_time".to_string(), json!(start_time.to_rfc3339()));
        }
        if let Some(duration) = request.duration_minutes {
            update_data.insert("duration_minutes".to_string(), json!(duration));
        }
        if let Some(status) = request.status {
            update_data.insert("status".to_string(), json!(status.to_string()));
            Self::stamp_transition(&mut update_data, status);
        }
        if let Some(patient_notes) = request.patient_notes {
            update_data.insert("patient_notes".to_string(), json!(patient_notes));
        }
        if let Some(specialist_notes) = request.specialist_notes {
            update_data.insert("specialist_notes".to_string(), json!(specialist_notes));
        }

        let updated = self
            .patch_booking(booking_id, update_data, auth_token)
            .await?;

        if request.status == Some(BookingStatus::Confirmed) {
            self.dispatch_confirmation(&updated);
        }

        info!("Booking {} updated", booking_id);
        Ok(updated)
    }

    /// Specialist accepts a pending booking.
    pub async fn confirm_booking(
        &self,
        booking_id: Uuid,
        auth_token: &str,
    ) -> Result<Booking, BookingError> {
        debug!("Confirming booking: {}", booking_id);

        let current = self.get_booking(booking_id, auth_token).await?;
        self.lifecycle
            .validate_transition(current.status, BookingStatus::Confirmed)?;

        let mut update_data = serde_json::Map::new();
        update_data.insert(
            "status".to_string(),
            json!(BookingStatus::Confirmed.to_string()),
        );
        Self::stamp_transition(&mut update_data, BookingStatus::Confirmed);

        let confirmed = self
            .patch_booking(booking_id, update_data, auth_token)
            .await?;

        self.dispatch_confirmation(&confirmed);

        info!("Booking {} confirmed", booking_id);
        Ok(confirmed)
    }

    /// Either party cancels a pending or confirmed booking.
    pub async fn cancel_booking(
        &self,
        booking_id: Uuid,
        reason: Option<String>,
        auth_token: &str,
    ) -> Result<Booking, BookingError> {
        debug!("Cancelling booking: {}", booking_id);

        let current = self.get_booking(booking_id, auth_token).await?;
        self.lifecycle
            .validate_transition(current.status, BookingStatus::Cancelled)?;

        let mut update_data = serde_json::Map::new();
        update_data.insert(
            "status".to_string(),
            json!(BookingStatus::Cancelled.to_string()),
        );
        Self::stamp_transition(&mut update_data, BookingStatus::Cancelled);
        if let Some(reason) = reason {
            update_data.insert("cancellation_reason".to_string(), json!(reason));
        }

        let cancelled = self
            .patch_booking(booking_id, update_data, auth_token)
            .await?;

        info!("Booking {} cancelled", booking_id);
        Ok(cancelled)
    }

    /// Specialist marks a confirmed booking as completed.
    pub async fn complete_booking(
        &self,
        booking_id: Uuid,
        auth_token: &str,
    ) -> Result<Booking, BookingError> {
        debug!("Completing booking: {}", booking_id);

        let current = self.get_booking(booking_id, auth_token).await?;
        self.lifecycle
            .validate_transition(current.status, BookingStatus::Completed)?;

        let mut update_data = serde_json::Map::new();
        update_data.insert(
            "status".to_string(),
            json!(BookingStatus::Completed.to_string()),
        );

        let completed = self
            .patch_booking(booking_id, update_data, auth_token)
            .await?;

        info!("Booking {} completed", booking_id);
        Ok(completed)
    }

    /// Specialist records that the patient did not show up.
    pub async fn mark_no_show(
        &self,
        booking_id: Uuid,
        auth_token: &str,
    ) -> Result<Booking, BookingError> {
        debug!("Marking booking as no-show: {}", booking_id);

        let current = self.get_booking(booking_id, auth_token).await?;
        self.lifecycle
            .validate_transition(current.status, BookingStatus::NoShow)?;

        let mut update_data = serde_json::Map::new();
        update_data.insert(
            "status".to_string(),
            json!(BookingStatus::NoShow.to_string()),
        );

        let updated = self
            .patch_booking(booking_id, update_data, auth_token)
            .await?;

        info!("Booking {} marked as no-show", booking_id);
        Ok(updated)
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    fn validate_duration(&self, duration_minutes: i32) -> Result<(), BookingError> {
        if duration_minutes < self.validation_rules.min_duration_minutes {
            return Err(BookingError::Validation(format!(
                "Booking duration must be at least {} minutes",
                self.validation_rules.min_duration_minutes
            )));
        }
        if duration_minutes > self.validation_rules.max_duration_minutes {
            return Err(BookingError::Validation(format!(
                "Booking duration cannot exceed {} minutes",
                self.validation_rules.max_duration_minutes
            )));
        }
        Ok(())
    }

    fn stamp_transition(update_data: &mut serde_json::Map<String, Value>, status: BookingStatus) {
        match status {
            BookingStatus::Confirmed => {
                update_data.insert("confirmed_at".to_string(), json!(Utc::now().to_rfc3339()));
            }
            BookingStatus::Cancelled => {
                update_data.insert("cancelled_at".to_string(), json!(Utc::now().to_rfc3339()));
            }
            _ => {}
        }
    }

    async fn patch_booking(
        &self,
        booking_id: Uuid,
        mut update_data: serde_json::Map<String, Value>,
        auth_token: &str,
    ) -> Result<Booking, BookingError> {
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/bookings?id=eq.{}", booking_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(Value::Object(update_data)),
                Some(headers),
            )
            .await
            .map_err(|e| match e {
                DbError::Conflict(_) => BookingError::SlotUnavailable,
                other => BookingError::DatabaseError(other.to_string()),
            })?;

        if result.is_empty() {
            return Err(BookingError::NotFound);
        }

        Self::parse_booking_row(result.into_iter().next())
    }

    /// Hand the confirmation to the notification pipeline without waiting on
    /// it; delivery failure never affects the booking.
    fn dispatch_confirmation(&self, booking: &Booking) {
        let notice = BookingConfirmedNotice {
            booking_id: booking.id,
            patient_id: booking.patient_id,
            specialist_id: booking.specialist_id,
            start_time: booking.start_time,
            duration_minutes: booking.duration_minutes,
        };
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            notifier.notify_booking_confirmed(notice).await;
        });
    }

    fn parse_booking_row(row: Option<Value>) -> Result<Booking, BookingError> {
        match row {
            Some(value) => serde_json::from_value(value).map_err(|e| {
                BookingError::DatabaseError(format!("Failed to parse booking: {}", e))
            }),
            None => Err(BookingError::DatabaseError(
                "Store returned no representation".to_string(),
            )),
        }
    }
}
