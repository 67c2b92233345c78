// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

/// Expects an `Extension<Arc<SchedulingRuntime>>` layered on by the application.
pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    // Slot availability is public
    let public_routes = Router::new()
        .route("/availability/{doctor_id}", get(handlers::get_day_availability))
        .route("/availability/{doctor_id}/upcoming", get(handlers::get_upcoming_availability));

    // Everything that reads or changes a patient's appointments requires authentication
    let protected_routes = Router::new()
        .route("/", get(handlers::list_appointments).post(handlers::book_appointment))
        .route("/{appointment_id}", delete(handlers::delete_appointment))
        .route("/{appointment_id}/reschedule", patch(handlers::reschedule_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
