// libs/booking-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::{DateTime, Utc};
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;
use shared_models::error::AppError;
use specialist_cell::models::{Specialist, SpecialistError};
use specialist_cell::services::profile::SpecialistProfileService;

use crate::models::{
    Booking, BookingError, BookingStatus, CancelBookingRequest, CreateBookingRequest,
    CreateSessionRequest, UpdateBookingRequest, UpdateSessionRequest,
};
use crate::services::booking::BookingService;
use crate::services::session::SessionService;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct PatientBookingsQuery {
    pub status: Option<BookingStatus>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct SpecialistBookingsQuery {
    pub status: Option<BookingStatus>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_booking(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let patient_id = parse_user_id(&user)?;

    let booking_service = BookingService::new(&state);
    let booking = booking_service
        .create_booking(patient_id, request, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "booking": booking,
        "message": "Booking created and awaiting confirmation"
    })))
}

#[axum::debug_handler]
pub async fn get_my_bookings(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<PatientBookingsQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let patient_id = parse_user_id(&user)?;

    let booking_service = BookingService::new(&state);
    let bookings = booking_service
        .list_for_patient(patient_id, query.status, query.limit, query.offset, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "bookings": bookings,
        "total": bookings.len()
    })))
}

#[axum::debug_handler]
pub async fn get_specialist_bookings(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<SpecialistBookingsQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let specialist = current_specialist(&state, &user, token).await?;

    let booking_service = BookingService::new(&state);
    let bookings = booking_service
        .list_for_specialist(
            specialist.id,
            query.status,
            query.from_date,
            query.to_date,
            query.limit,
            query.offset,
            token,
        )
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "bookings": bookings,
        "total": bookings.len()
    })))
}

#[axum::debug_handler]
pub async fn get_booking(
    State(state): State<Arc<AppConfig>>,
    Path(booking_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = BookingService::new(&state);

    let booking = booking_service
        .get_booking(booking_id, token)
        .await
        .map_err(map_booking_error)?;

    authorize_participant(&state, &user, &booking, token).await?;

    Ok(Json(json!(booking)))
}

#[axum::debug_handler]
pub async fn update_booking(
    State(state): State<Arc<AppConfig>>,
    Path(booking_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = BookingService::new(&state);

    let booking = booking_service
        .get_booking(booking_id, token)
        .await
        .map_err(map_booking_error)?;

    // Only the patient who made the booking reschedules or edits it.
    let is_patient = booking.patient_id.to_string() == user.id;
    let is_admin = user.role.as_deref() == Some("admin");
    if !is_patient && !is_admin {
        return Err(AppError::Auth(
            "Only the patient can update booking details".to_string(),
        ));
    }

    let updated = booking_service
        .update_booking(booking_id, request, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "booking": updated
    })))
}

#[axum::debug_handler]
pub async fn confirm_booking(
    State(state): State<Arc<AppConfig>>,
    Path(booking_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = BookingService::new(&state);

    let booking = booking_service
        .get_booking(booking_id, token)
        .await
        .map_err(map_booking_error)?;
    authorize_owning_specialist(&state, &user, &booking, token).await?;

    let confirmed = booking_service
        .confirm_booking(booking_id, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "booking": confirmed,
        "message": "Booking confirmed"
    })))
}

#[axum::debug_handler]
pub async fn cancel_booking(
    State(state): State<Arc<AppConfig>>,
    Path(booking_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = BookingService::new(&state);

    let booking = booking_service
        .get_booking(booking_id, token)
        .await
        .map_err(map_booking_error)?;
    authorize_participant(&state, &user, &booking, token).await?;

    let cancelled = booking_service
        .cancel_booking(booking_id, request.reason, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "booking": cancelled,
        "message": "Booking cancelled"
    })))
}

#[axum::debug_handler]
pub async fn complete_booking(
    State(state): State<Arc<AppConfig>>,
    Path(booking_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = BookingService::new(&state);

    let booking = booking_service
        .get_booking(booking_id, token)
        .await
        .map_err(map_booking_error)?;
    authorize_owning_specialist(&state, &user, &booking, token).await?;

    let completed = booking_service
        .complete_booking(booking_id, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "booking": completed,
        "message": "Booking completed"
    })))
}

#[axum::debug_handler]
pub async fn mark_no_show(
    State(state): State<Arc<AppConfig>>,
    Path(booking_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = BookingService::new(&state);

    let booking = booking_service
        .get_booking(booking_id, token)
        .await
        .map_err(map_booking_error)?;
    authorize_owning_specialist(&state, &user, &booking, token).await?;

    let updated = booking_service
        .mark_no_show(booking_id, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "booking": updated,
        "message": "Booking marked as no-show"
    })))
}

// ==============================================================================
// SESSION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_session(
    State(state): State<Arc<AppConfig>>,
    Path(booking_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = BookingService::new(&state);
    let session_service = SessionService::new(Arc::new(SupabaseClient::new(&state)));

    let booking = booking_service
        .get_booking(booking_id, token)
        .await
        .map_err(map_booking_error)?;
    authorize_owning_specialist(&state, &user, &booking, token).await?;

    let session = session_service
        .create_session(&booking, request, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "session": session
    })))
}

#[axum::debug_handler]
pub async fn get_booking_session(
    State(state): State<Arc<AppConfig>>,
    Path(booking_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = BookingService::new(&state);
    let session_service = SessionService::new(Arc::new(SupabaseClient::new(&state)));

    let booking = booking_service
        .get_booking(booking_id, token)
        .await
        .map_err(map_booking_error)?;
    authorize_participant(&state, &user, &booking, token).await?;

    let session = session_service
        .get_session_for_booking(booking_id, token)
        .await
        .map_err(map_booking_error)?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    Ok(Json(json!(session)))
}

#[axum::debug_handler]
pub async fn update_session(
    State(state): State<Arc<AppConfig>>,
    Path(session_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateSessionRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = BookingService::new(&state);
    let session_service = SessionService::new(Arc::new(SupabaseClient::new(&state)));

    let session = session_service
        .get_session(session_id, token)
        .await
        .map_err(map_booking_error)?;
    let booking = booking_service
        .get_booking(session.booking_id, token)
        .await
        .map_err(map_booking_error)?;
    authorize_owning_specialist(&state, &user, &booking, token).await?;

    let updated = session_service
        .update_session(session_id, request, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "session": updated
    })))
}

// ==============================================================================
// HELPERS
// ==============================================================================

async fn current_specialist(
    config: &Arc<AppConfig>,
    user: &User,
    token: &str,
) -> Result<Specialist, AppError> {
    let profile_service = SpecialistProfileService::new(config);
    profile_service
        .get_specialist_for_user(&user.id, token)
        .await
        .map_err(|e| match e {
            SpecialistError::NotFound => {
                AppError::Auth("No specialist profile for this user".to_string())
            }
            SpecialistError::DatabaseError(msg) => AppError::Database(msg),
        })
}

fn parse_user_id(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Token subject is not a valid user id".to_string()))
}

/// The booking's patient, its specialist's owning user, or an admin.
async fn authorize_participant(
    config: &Arc<AppConfig>,
    user: &User,
    booking: &Booking,
    token: &str,
) -> Result<(), AppError> {
    let is_patient = booking.patient_id.to_string() == user.id;
    let is_admin = user.role.as_deref() == Some("admin");

    if is_patient || is_admin {
        return Ok(());
    }

    if owns_specialist_profile(config, user, booking, token).await? {
        return Ok(());
    }

    Err(AppError::Auth(
        "Not authorized to access this booking".to_string(),
    ))
}

async fn authorize_owning_specialist(
    config: &Arc<AppConfig>,
    user: &User,
    booking: &Booking,
    token: &str,
) -> Result<(), AppError> {
    let is_admin = user.role.as_deref() == Some("admin");
    if is_admin || owns_specialist_profile(config, user, booking, token).await? {
        return Ok(());
    }

    Err(AppError::Auth(
        "Only the booked specialist can perform this action".to_string(),
    ))
}

async fn owns_specialist_profile(
    config: &Arc<AppConfig>,
    user: &User,
    booking: &Booking,
    token: &str,
) -> Result<bool, AppError> {
    let profile_service = SpecialistProfileService::new(config);
    match profile_service.get_specialist_for_user(&user.id, token).await {
        Ok(specialist) => Ok(specialist.id == booking.specialist_id),
        Err(SpecialistError::NotFound) => Ok(false),
        Err(SpecialistError::DatabaseError(msg)) => Err(AppError::Database(msg)),
    }
}

fn map_booking_error(e: BookingError) -> AppError {
    match e {
        BookingError::NotFound => AppError::NotFound("Booking not found".to_string()),
        BookingError::SessionNotFound => AppError::NotFound("Session not found".to_string()),
        BookingError::SessionExists => {
            AppError::Conflict("Session already exists for this booking".to_string())
        }
        BookingError::SpecialistNotFound => {
            AppError::NotFound("Specialist not found".to_string())
        }
        BookingError::SpecialistUnavailable => {
            AppError::BadRequest("Specialist is not currently available".to_string())
        }
        BookingError::SlotUnavailable => {
            AppError::SlotUnavailable("Time slot is not available".to_string())
        }
        BookingError::InvalidTransition { .. } => AppError::InvalidState(e.to_string()),
        BookingError::Validation(msg) => AppError::ValidationError(msg),
        BookingError::DatabaseError(msg) => AppError::Database(msg),
    }
}
