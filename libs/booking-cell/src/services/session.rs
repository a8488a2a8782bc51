// libs/booking-cell/src/services/session.rs
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{
    Booking, BookingError, BookingStatus, CounsellingSession, CreateSessionRequest,
    UpdateSessionRequest,
};

/// Session records: one per confirmed booking, capturing what actually
/// happened.
pub struct SessionService {
    supabase: Arc<SupabaseClient>,
}

impl SessionService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Create the session record for a confirmed booking. The booking must
    /// be confirmed and must not already have one.
    pub async fn create_session(
        &self,
        booking: &Booking,
        request: CreateSessionRequest,
        auth_token: &str,
    ) -> Result<CounsellingSession, BookingError> {
        debug!("Creating session for booking: {}", booking.id);

        if booking.status != BookingStatus::Confirmed {
            return Err(BookingError::Validation(format!(
                "Can only create sessions for confirmed bookings, current status: {}",
                booking.status
            )));
        }

        if self
            .get_session_for_booking(booking.id, auth_token)
            .await?
            .is_some()
        {
            return Err(BookingError::SessionExists);
        }

        let now = chrono::Utc::now();
        let session_data = json!({
            "booking_id": booking.id,
            "started_at": request.started_at.map(|t| t.to_rfc3339()),
            "specialist_notes": request.specialist_notes,
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
                "/rest/v1/sessions",
                Some(auth_token),
                Some(session_data),
                Some(headers),
            )
            .await
            .map_err(|e| match e {
                // Unique booking_id: someone else created it first.
                shared_database::supabase::DbError::Conflict(_) => BookingError::SessionExists,
                other => BookingError::DatabaseError(other.to_string()),
            })?;

        let session = Self::parse_session_row(result.into_iter().next())?;
        info!("Session {} created for booking {}", session.id, booking.id);

        Ok(session)
    }

    pub async fn get_session(
        &self,
        session_id: Uuid,
        auth_token: &str,
    ) -> Result<CounsellingSession, BookingError> {
        debug!("Fetching session: {}", session_id);

        let path = format!("/rest/v1/sessions?id=eq.{}", session_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => Self::parse_session_row(Some(row)),
            None => Err(BookingError::SessionNotFound),
        }
    }

    pub async fn get_session_for_booking(
        &self,
        booking_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<CounsellingSession>, BookingError> {
        let path = format!("/rest/v1/sessions?booking_id=eq.{}", booking_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => Ok(Some(Self::parse_session_row(Some(row))?)),
            None => Ok(None),
        }
    }

    /// Update session details (actual times, notes, summary).
    pub async fn update_session(
        &self,
        session_id: Uuid,
        request: UpdateSessionRequest,
        auth_token: &str,
    ) -> Result<CounsellingSession, BookingError> {
        debug!("Updating session: {}", session_id);

        if let (Some(start), Some(end)) = (request.started_at, request.ended_at) {
            if end <= start {
                return Err(BookingError::Validation(
                    "Session end must be after its start".to_string(),
                ));
            }
        }

        let mut update_data = serde_json::Map::new();
        if let Some(started_at) = request.started_at {
            update_data.insert("started_at".to_string(), json!(started_at.to_rfc3339()));
        }
        if let Some(ended_at) = request.ended_at {
            update_data.insert("ended_at".to_string(), json!(ended_at.to_rfc3339()));
        }
        if let Some(notes) = request.specialist_notes {
            update_data.insert("specialist_notes".to_string(), json!(notes));
        }
        if let Some(summary) = request.summary {
            update_data.insert("summary".to_string(), json!(summary));
        }
        update_data.insert(
            "updated_at".to_string(),
            json!(chrono::Utc::now().to_rfc3339()),
        );

        let path = format!("/rest/v1/sessions?id=eq.{}", session_id);
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
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(BookingError::SessionNotFound);
        }

        Self::parse_session_row(result.into_iter().next())
    }

    fn parse_session_row(row: Option<Value>) -> Result<CounsellingSession, BookingError> {
        match row {
            Some(value) => serde_json::from_value(value).map_err(|e| {
                BookingError::DatabaseError(format!("Failed to parse session: {}", e))
            }),
            None => Err(BookingError::DatabaseError(
                "Store returned no representation".to_string(),
            )),
        }
    }
}
