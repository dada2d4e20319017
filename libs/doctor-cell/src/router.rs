use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::{AvailabilityService, SlotService};

#[derive(Clone)]
pub struct DoctorCellState {
    pub config: Arc<AppConfig>,
    pub availability: Arc<AvailabilityService>,
    pub slots: Arc<SlotService>,
}

/// Routes mounted under `/doctors`. Every route requires a bearer token.
pub fn doctor_routes(state: DoctorCellState) -> Router {
    Router::new()
        .route(
            "/{doctor_id}/availability",
            get(handlers::get_weekly_availability).put(handlers::set_weekly_availability),
        )
        .route("/{doctor_id}/slots", get(handlers::get_available_slots))
        .route("/{doctor_id}/slots/generate", post(handlers::generate_slots))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
