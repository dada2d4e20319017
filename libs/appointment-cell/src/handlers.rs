use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::principal_of;

use crate::models::{
    Appointment, AppointmentSearchQuery, AuditRecord, BookAppointmentRequest, UpdateStatusRequest,
};
use crate::router::AppointmentCellState;

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<AppointmentCellState>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Appointment>), AppError> {
    let principal = principal_of(&user)?;
    let appointment = state.booking.book_appointment(&principal, request).await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<AppointmentCellState>,
    Query(query): Query<AppointmentSearchQuery>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let principal = principal_of(&user)?;
    Ok(Json(state.booking.search_appointments(&principal, query).await?))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentCellState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Appointment>, AppError> {
    let principal = principal_of(&user)?;
    Ok(Json(state.booking.get_appointment(&principal, appointment_id).await?))
}

#[axum::debug_handler]
pub async fn get_appointment_by_code(
    State(state): State<AppointmentCellState>,
    Path(code): Path<String>,
    Extension(user): Extension<User>,
) -> Result<Json<Appointment>, AppError> {
    let principal = principal_of(&user)?;
    Ok(Json(state.booking.get_appointment_by_code(&principal, &code).await?))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<AppointmentCellState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Appointment>, AppError> {
    let principal = principal_of(&user)?;
    let appointment = state
        .lifecycle
        .update_status(&principal, appointment_id, request.status)
        .await?;
    Ok(Json(appointment))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<AppointmentCellState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<StatusCode, AppError> {
    let principal = principal_of(&user)?;
    state.lifecycle.delete_appointment(&principal, appointment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn get_audit_trail(
    State(state): State<AppointmentCellState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<AuditRecord>>, AppError> {
    let principal = principal_of(&user)?;
    Ok(Json(state.booking.audit_trail(&principal, appointment_id).await?))
}
