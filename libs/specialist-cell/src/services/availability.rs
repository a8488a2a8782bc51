// libs/specialist-cell/src/services/availability.rs
use chrono::NaiveDate;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{DbError, SupabaseClient};

use crate::models::{
    AvailabilityError, AvailabilityWindow, BookedInterval, BulkCreateWindowsRequest,
    CreateWindowRequest, DayOfWeek, OpenSlot, UpdateWindowRequest,
};
use crate::services::slots;

pub struct AvailabilityService {
    supabase: SupabaseClient,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Create an availability window for a specialist.
    pub async fn create_window(
        &self,
        specialist_id: Uuid,
        request: CreateWindowRequest,
        auth_token: &str,
    ) -> Result<AvailabilityWindow, AvailabilityError> {
        debug!("Creating availability window for specialist: {}", specialist_id);

        Self::validate_time_range(&request)?;

        let existing = self
            .get_active_windows_for_day(specialist_id, request.day_of_week, auth_token)
            .await?;
        Self::check_window_conflicts(&request, &existing, None)?;

        let now = chrono::Utc::now();
        let window_data = json!({
            "specialist_id": specialist_id,
            "day_of_week": request.day_of_week.to_string(),
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": request.end_time.format("%H:%M:%S").to_string(),
            "is_active": request.is_active.unwrap_or(true),
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
                "/rest/v1/availability_windows",
                Some(auth_token),
                Some(window_data),
                Some(headers),
            )
            .await
            .map_err(Self::map_db_error)?;

        let window = Self::parse_window_row(result.into_iter().next())?;
        debug!("Availability window created with ID: {}", window.id);

        Ok(window)
    }

    /// Create several windows in one shot. The whole batch is validated
    /// against existing windows and against earlier entries in the batch
    /// before anything is written; the insert itself is a single statement,
    /// so either every row commits or none does.
    pub async fn bulk_create_windows(
        &self,
        specialist_id: Uuid,
        request: BulkCreateWindowsRequest,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError> {
        debug!(
            "Bulk creating {} availability windows for specialist: {}",
            request.windows.len(),
            specialist_id
        );

        if request.windows.is_empty() {
            return Err(AvailabilityError::Validation(
                "No availability windows supplied".to_string(),
            ));
        }

        let existing = self
            .get_active_windows(specialist_id, auth_token)
            .await?;

        let mut accepted: Vec<&CreateWindowRequest> = Vec::with_capacity(request.windows.len());
        for window in &request.windows {
            Self::validate_time_range(window)?;

            let same_day_existing: Vec<AvailabilityWindow> = existing
                .iter()
                .filter(|w| w.day_of_week == window.day_of_week)
                .cloned()
                .collect();
            Self::check_window_conflicts(window, &same_day_existing, None)?;

            // Also conflict against earlier batch entries, as if added one
            // at a time.
            for prior in &accepted {
                if prior.day_of_week == window.day_of_week
                    && window.is_active.unwrap_or(true)
                    && prior.is_active.unwrap_or(true)
                    && slots::times_overlap(
                        window.start_time,
                        window.end_time,
                        prior.start_time,
                        prior.end_time,
                    )
                {
                    return Err(AvailabilityError::Conflict(format!(
                        "Window {} {}-{} overlaps another window in the batch",
                        window.day_of_week, window.start_time, window.end_time
                    )));
                }
            }

            accepted.push(window);
        }

        let now = chrono::Utc::now();
        let rows: Vec<Value> = request
            .windows
            .iter()
            .map(|w| {
                json!({
                    "specialist_id": specialist_id,
                    "day_of_week": w.day_of_week.to_string(),
                    "start_time": w.start_time.format("%H:%M:%S").to_string(),
                    "end_time": w.end_time.format("%H:%M:%S").to_string(),
                    "is_active": w.is_active.unwrap_or(true),
                    "created_at": now.to_rfc3339(),
                    "updated_at": now.to_rfc3339(),
                })
            })
            .collect();

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/availability_windows",
                Some(auth_token),
                Some(Value::Array(rows)),
                Some(headers),
            )
            .await
            .map_err(Self::map_db_error)?;

        let windows = result
            .into_iter()
            .map(|row| serde_json::from_value(row))
            .collect::<Result<Vec<AvailabilityWindow>, _>>()
            .map_err(|e| {
                AvailabilityError::DatabaseError(format!("Failed to parse created windows: {}", e))
            })?;

        debug!("Bulk created {} availability windows", windows.len());
        Ok(windows)
    }

    /// Update a window. The merged result (current fields plus supplied
    /// changes) is re-validated against all other windows for the
    /// specialist and day, excluding the window itself.
    pub async fn update_window(
        &self,
        window_id: Uuid,
        request: UpdateWindowRequest,
        auth_token: &str,
    ) -> Result<AvailabilityWindow, AvailabilityError> {
        debug!("Updating availability window: {}", window_id);

        let current = self.get_window(window_id, auth_token).await?;

        let merged = CreateWindowRequest {
            day_of_week: request.day_of_week.unwrap_or(current.day_of_week),
            start_time: request.start_time.unwrap_or(current.start_time),
            end_time: request.end_time.unwrap_or(current.end_time),
            is_active: Some(request.is_active.unwrap_or(current.is_active)),
        };

        Self::validate_time_range(&merged)?;

        let others = self
            .get_active_windows_for_day(current.specialist_id, merged.day_of_week, auth_token)
            .await?;
        Self::check_window_conflicts(&merged, &others, Some(window_id))?;

        let mut update_data = serde_json::Map::new();
        if let Some(day) = request.day_of_week {
            update_data.insert("day_of_week".to_string(), json!(day.to_string()));
        }
        if let Some(start) = request.start_time {
            update_data.insert(
                "start_time".to_string(),
                json!(start.format("%H:%M:%S").to_string()),
            );
        }
        if let Some(end) = request.end_time {
            update_data.insert(
                "end_time".to_string(),
                json!(end.format("%H:%M:%S").to_string()),
            );
        }
        if let Some(is_active) = request.is_active {
            update_data.insert("is_active".to_string(), json!(is_active));
        }
        update_data.insert(
            "updated_at".to_string(),
            json!(chrono::Utc::now().to_rfc3339()),
        );

        let path = format!("/rest/v1/availability_windows?id=eq.{}", window_id);
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
            .map_err(Self::map_db_error)?;

        Self::parse_window_row(result.into_iter().next())
    }

    /// Delete a window. Deleting an id that no longer exists is a no-op
    /// reported as `false`, not an error.
    pub async fn delete_window(
        &self,
        window_id: Uuid,
        auth_token: &str,
    ) -> Result<bool, AvailabilityError> {
        debug!("Deleting availability window: {}", window_id);

        let path = format!("/rest/v1/availability_windows?id=eq.{}", window_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let deleted: Vec<Value> = self
            .supabase
            .request_with_headers(Method::DELETE, &path, Some(auth_token), None, Some(headers))
            .await
            .map_err(Self::map_db_error)?;

        Ok(!deleted.is_empty())
    }

    /// Remove every window belonging to a specialist; returns how many rows
    /// went away.
    pub async fn clear_windows(
        &self,
        specialist_id: Uuid,
        auth_token: &str,
    ) -> Result<usize, AvailabilityError> {
        debug!("Clearing all availability windows for specialist: {}", specialist_id);

        let path = format!(
            "/rest/v1/availability_windows?specialist_id=eq.{}",
            specialist_id
        );
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let deleted: Vec<Value> = self
            .supabase
            .request_with_headers(Method::DELETE, &path, Some(auth_token), None, Some(headers))
            .await
            .map_err(Self::map_db_error)?;

        Ok(deleted.len())
    }

    /// List a specialist's windows, optionally filtered by day and active
    /// flag, ordered by day then start time.
    pub async fn list_windows(
        &self,
        specialist_id: Uuid,
        day_of_week: Option<DayOfWeek>,
        is_active: Option<bool>,
        auth_token: Option<&str>,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError> {
        debug!("Fetching availability windows for specialist: {}", specialist_id);

        let mut path = format!(
            "/rest/v1/availability_windows?specialist_id=eq.{}",
            specialist_id
        );
        if let Some(day) = day_of_week {
            path.push_str(&format!("&day_of_week=eq.{}", day));
        }
        if let Some(active) = is_active {
            path.push_str(&format!("&is_active=eq.{}", active));
        }
        path.push_str("&order=day_of_week.asc,start_time.asc");

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(Self::map_db_error)?;

        result
            .into_iter()
            .map(|row| serde_json::from_value(row))
            .collect::<Result<Vec<AvailabilityWindow>, _>>()
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse windows: {}", e)))
    }

    /// Compute open slots for a specialist on one date.
    ///
    /// Pure read: windows for the date's weekday minus the intervals of
    /// pending/confirmed bookings starting on that date, walked at the fixed
    /// slot stride. The winner of a concurrent booking race is decided at
    /// the store, not here.
    pub async fn compute_open_slots(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
        duration_minutes: i32,
        auth_token: Option<&str>,
    ) -> Result<Vec<OpenSlot>, AvailabilityError> {
        debug!(
            "Computing open slots for specialist {} on {} ({} min)",
            specialist_id, date, duration_minutes
        );

        if !(15..=480).contains(&duration_minutes) {
            return Err(AvailabilityError::Validation(
                "Duration must be between 15 and 480 minutes".to_string(),
            ));
        }

        let day = DayOfWeek::from_date(date);
        let windows = self
            .list_windows(specialist_id, Some(day), Some(true), auth_token)
            .await?;

        if windows.is_empty() {
            return Ok(vec![]);
        }

        let booked = self
            .get_booked_intervals_for_date(specialist_id, date, auth_token)
            .await?;
        let booked_ranges: Vec<_> = booked
            .iter()
            .map(|b| (b.start_time, b.end_time()))
            .collect();

        let mut open_slots = Vec::new();
        for window in &windows {
            open_slots.extend(slots::slots_in_window(
                date,
                window.start_time,
                window.end_time,
                duration_minutes,
                &booked_ranges,
            ));
        }

        open_slots.sort_by(|a, b| a.start_time.cmp(&b.start_time));

        debug!("Found {} open slots", open_slots.len());
        Ok(open_slots)
    }

    /// Fetch a single window by id.
    pub async fn get_window(
        &self,
        window_id: Uuid,
        auth_token: &str,
    ) -> Result<AvailabilityWindow, AvailabilityError> {
        let path = format!("/rest/v1/availability_windows?id=eq.{}", window_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(Self::map_db_error)?;

        match result.into_iter().next() {
            Some(row) => serde_json::from_value(row).map_err(|e| {
                AvailabilityError::DatabaseError(format!("Failed to parse window: {}", e))
            }),
            None => Err(AvailabilityError::WindowNotFound),
        }
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn get_active_windows(
        &self,
        specialist_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError> {
        let path = format!(
            "/rest/v1/availability_windows?specialist_id=eq.{}&is_active=eq.true",
            specialist_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(Self::map_db_error)?;

        result
            .into_iter()
            .map(|row| serde_json::from_value(row))
            .collect::<Result<Vec<AvailabilityWindow>, _>>()
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse windows: {}", e)))
    }

    async fn get_active_windows_for_day(
        &self,
        specialist_id: Uuid,
        day_of_week: DayOfWeek,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError> {
        let path = format!(
            "/rest/v1/availability_windows?specialist_id=eq.{}&day_of_week=eq.{}&is_active=eq.true",
            specialist_id, day_of_week
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(Self::map_db_error)?;

        result
            .into_iter()
            .map(|row| serde_json::from_value(row))
            .collect::<Result<Vec<AvailabilityWindow>, _>>()
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse windows: {}", e)))
    }

    /// Bookings whose start time falls on the given calendar date. Day
    /// boundaries are naive date bounds, matching the wall-clock windows.
    async fn get_booked_intervals_for_date(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<Vec<BookedInterval>, AvailabilityError> {
        let start_of_day = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let end_of_day = date.and_hms_opt(23, 59, 59).unwrap().and_utc();

        let path = format!(
            "/rest/v1/bookings?specialist_id=eq.{}&start_time=gte.{}&start_time=lte.{}&status=in.(pending,confirmed)&select=start_time,duration_minutes&order=start_time.asc",
            specialist_id,
            urlencoding::encode(&start_of_day.to_rfc3339()),
            urlencoding::encode(&end_of_day.to_rfc3339()),
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(Self::map_db_error)?;

        result
            .into_iter()
            .map(|row| serde_json::from_value(row))
            .collect::<Result<Vec<BookedInterval>, _>>()
            .map_err(|e| {
                AvailabilityError::DatabaseError(format!("Failed to parse bookings: {}", e))
            })
    }

    fn validate_time_range(request: &CreateWindowRequest) -> Result<(), AvailabilityError> {
        if request.start_time >= request.end_time {
            return Err(AvailabilityError::Validation(
                "Start time must be before end time".to_string(),
            ));
        }
        Ok(())
    }

    /// Reject a window that overlaps any active window in `existing`,
    /// excluding `exclude_id` (the window being updated). An inactive
    /// candidate never conflicts.
    fn check_window_conflicts(
        candidate: &CreateWindowRequest,
        existing: &[AvailabilityWindow],
        exclude_id: Option<Uuid>,
    ) -> Result<(), AvailabilityError> {
        if !candidate.is_active.unwrap_or(true) {
            return Ok(());
        }

        for window in existing {
            if Some(window.id) == exclude_id {
                continue;
            }
            if slots::times_overlap(
                candidate.start_time,
                candidate.end_time,
                window.start_time,
                window.end_time,
            ) {
                warn!(
                    "Window conflict on {}: {}-{} vs existing {}-{}",
                    candidate.day_of_week,
                    candidate.start_time,
                    candidate.end_time,
                    window.start_time,
                    window.end_time
                );
                return Err(AvailabilityError::Conflict(format!(
                    "{} {}-{} overlaps existing window {}-{}",
                    candidate.day_of_week,
                    candidate.start_time,
                    candidate.end_time,
                    window.start_time,
                    window.end_time
                )));
            }
        }

        Ok(())
    }

    fn parse_window_row(row: Option<Value>) -> Result<AvailabilityWindow, AvailabilityError> {
        match row {
            Some(value) => serde_json::from_value(value).map_err(|e| {
                AvailabilityError::DatabaseError(format!("Failed to parse window: {}", e))
            }),
            None => Err(AvailabilityError::DatabaseError(
                "Store returned no representation".to_string(),
            )),
        }
    }

    fn map_db_error(err: DbError) -> AvailabilityError {
        match err {
            DbError::NotFound(msg) => AvailabilityError::DatabaseError(msg),
            DbError::Conflict(msg) => AvailabilityError::Conflict(msg),
            other => AvailabilityError::DatabaseError(other.to_string()),
        }
    }
}
