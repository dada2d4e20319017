use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::principal_of;

use crate::models::{
    AvailableSlotsQuery, SetAvailabilityRequest, SlotGenerationRequest, TimeSlot, WeeklyAvailability,
};
use crate::router::DoctorCellState;

// ==============================================================================
// WEEKLY AVAILABILITY
// ==============================================================================

#[axum::debug_handler]
pub async fn get_weekly_availability(
    State(state): State<DoctorCellState>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Vec<WeeklyAvailability>>, AppError> {
    let rows = state.availability.get_weekly_availability(doctor_id).await?;
    Ok(Json(rows))
}

#[axum::debug_handler]
pub async fn set_weekly_availability(
    State(state): State<DoctorCellState>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<SetAvailabilityRequest>,
) -> Result<Json<Vec<WeeklyAvailability>>, AppError> {
    let principal = principal_of(&user)?;

    let rows = state
        .availability
        .set_weekly_availability(&principal, doctor_id, request.days)
        .await?;

    Ok(Json(rows))
}

// ==============================================================================
// SLOTS
// ==============================================================================

#[axum::debug_handler]
pub async fn generate_slots(
    State(state): State<DoctorCellState>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<SlotGenerationRequest>,
) -> Result<Json<Vec<TimeSlot>>, AppError> {
    let principal = principal_of(&user)?;
    let slots = state.slots.generate_slots(&principal, doctor_id, request).await?;
    Ok(Json(slots))
}

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<DoctorCellState>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<AvailableSlotsQuery>,
) -> Result<Json<Vec<TimeSlot>>, AppError> {
    let slots = state.slots.get_available_slots(doctor_id, query.date).await?;
    Ok(Json(slots))
}
