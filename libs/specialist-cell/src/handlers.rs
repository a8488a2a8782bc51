// libs/specialist-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AvailabilityError, BulkCreateWindowsRequest, CreateWindowRequest, DayOfWeek, Specialist,
    SpecialistError, UpdateWindowRequest,
};
use crate::services::availability::AvailabilityService;
use crate::services::profile::SpecialistProfileService;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct SpecialistListQuery {
    pub specialization: Option<String>,
    pub available_only: Option<bool>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct WindowListQuery {
    pub day_of_week: Option<DayOfWeek>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct OpenSlotsQuery {
    pub date: NaiveDate,
    pub duration_minutes: Option<i32>,
}

// ==============================================================================
// PUBLIC HANDLERS (NO AUTHENTICATION REQUIRED)
// ==============================================================================

#[axum::debug_handler]
pub async fn list_specialists(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<SpecialistListQuery>,
) -> Result<Json<Value>, AppError> {
    let profile_service = SpecialistProfileService::new(&state);

    let specialists = profile_service
        .list_specialists(
            query.specialization,
            query.available_only.unwrap_or(true),
            query.limit,
            query.offset,
        )
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "specialists": specialists,
        "total": specialists.len()
    })))
}

#[axum::debug_handler]
pub async fn get_specialist(
    State(state): State<Arc<AppConfig>>,
    Path(specialist_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let profile_service = SpecialistProfileService::new(&state);

    let specialist = profile_service
        .get_specialist(specialist_id, None)
        .await
        .map_err(|e| match e {
            SpecialistError::NotFound => AppError::NotFound("Specialist not found".to_string()),
            SpecialistError::DatabaseError(msg) => AppError::Database(msg),
        })?;

    Ok(Json(json!(specialist)))
}

#[axum::debug_handler]
pub async fn get_specialist_windows(
    State(state): State<Arc<AppConfig>>,
    Path(specialist_id): Path<Uuid>,
    Query(query): Query<WindowListQuery>,
) -> Result<Json<Value>, AppError> {
    let availability_service = AvailabilityService::new(&state);

    let windows = availability_service
        .list_windows(specialist_id, query.day_of_week, query.is_active, None)
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "windows": windows,
        "total": windows.len()
    })))
}

#[axum::debug_handler]
pub async fn get_open_slots(
    State(state): State<Arc<AppConfig>>,
    Path(specialist_id): Path<Uuid>,
    Query(query): Query<OpenSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let availability_service = AvailabilityService::new(&state);

    let slots = availability_service
        .compute_open_slots(
            specialist_id,
            query.date,
            query.duration_minutes.unwrap_or(60),
            None,
        )
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "date": query.date,
        "slots": slots,
        "total": slots.len()
    })))
}

// ==============================================================================
// PROTECTED HANDLERS (CURRENT SPECIALIST)
// ==============================================================================

#[axum::debug_handler]
pub async fn create_window(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateWindowRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let specialist = current_specialist(&state, &user, token).await?;

    let availability_service = AvailabilityService::new(&state);
    let window = availability_service
        .create_window(specialist.id, request, token)
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "success": true,
        "window": window
    })))
}

#[axum::debug_handler]
pub async fn bulk_create_windows(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BulkCreateWindowsRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let specialist = current_specialist(&state, &user, token).await?;

    let availability_service = AvailabilityService::new(&state);
    let windows = availability_service
        .bulk_create_windows(specialist.id, request, token)
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "success": true,
        "windows": windows,
        "total": windows.len()
    })))
}

#[axum::debug_handler]
pub async fn get_my_windows(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<WindowListQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let specialist = current_specialist(&state, &user, token).await?;

    let availability_service = AvailabilityService::new(&state);
    let windows = availability_service
        .list_windows(
            specialist.id,
            query.day_of_week,
            query.is_active,
            Some(token),
        )
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "windows": windows,
        "total": windows.len()
    })))
}

#[axum::debug_handler]
pub async fn update_window(
    State(state): State<Arc<AppConfig>>,
    Path(window_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateWindowRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let specialist = current_specialist(&state, &user, token).await?;

    let availability_service = AvailabilityService::new(&state);

    let window = availability_service
        .get_window(window_id, token)
        .await
        .map_err(map_availability_error)?;
    if window.specialist_id != specialist.id {
        return Err(AppError::Auth(
            "Not authorized to modify this availability window".to_string(),
        ));
    }

    let updated = availability_service
        .update_window(window_id, request, token)
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "success": true,
        "window": updated
    })))
}

#[axum::debug_handler]
pub async fn delete_window(
    State(state): State<Arc<AppConfig>>,
    Path(window_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let specialist = current_specialist(&state, &user, token).await?;

    let availability_service = AvailabilityService::new(&state);

    // Deleting an already-gone window stays a no-op, so the ownership check
    // only applies when the row still exists.
    match availability_service.get_window(window_id, token).await {
        Ok(window) if window.specialist_id != specialist.id => {
            return Err(AppError::Auth(
                "Not authorized to delete this availability window".to_string(),
            ));
        }
        Ok(_) => {}
        Err(AvailabilityError::WindowNotFound) => {
            return Ok(Json(json!({ "deleted": false })));
        }
        Err(e) => return Err(map_availability_error(e)),
    }

    let deleted = availability_service
        .delete_window(window_id, token)
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({ "deleted": deleted })))
}

#[axum::debug_handler]
pub async fn clear_windows(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let specialist = current_specialist(&state, &user, token).await?;

    let availability_service = AvailabilityService::new(&state);
    let deleted = availability_service
        .clear_windows(specialist.id, token)
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "success": true,
        "deleted": deleted
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

fn map_availability_error(e: AvailabilityError) -> AppError {
    match e {
        AvailabilityError::WindowNotFound => {
            AppError::NotFound("Availability window not found".to_string())
        }
        AvailabilityError::SpecialistNotFound => {
            AppError::NotFound("Specialist not found".to_string())
        }
        AvailabilityError::Conflict(msg) => AppError::Conflict(msg),
        AvailabilityError::Validation(msg) => AppError::ValidationError(msg),
        AvailabilityError::DatabaseError(msg) => AppError::Database(msg),
    }
}
