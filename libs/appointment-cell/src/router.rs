use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::{BookingService, LifecycleService};

#[derive(Clone)]
pub struct AppointmentCellState {
    pub config: Arc<AppConfig>,
    pub booking: Arc<BookingService>,
    pub lifecycle: Arc<LifecycleService>,
}

/// Routes mounted under `/appointments`. Every route requires a bearer token.
pub fn appointment_routes(state: AppointmentCellState) -> Router {
    Router::new()
        .route(
            "/",
            get(handlers::search_appointments).post(handlers::book_appointment),
        )
        .route("/code/{code}", get(handlers::get_appointment_by_code))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment).delete(handlers::delete_appointment),
        )
        .route("/{appointment_id}/status", patch(handlers::update_appointment_status))
        .route("/{appointment_id}/audit", get(handlers::get_audit_trail))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
