use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

/// Every route is the caller's own inbox. `/stream` expects an
/// `Extension<Arc<ChangeFeed>>` layered on by the application.
pub fn notification_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(handlers::list_notifications))
        .route("/unread-count", get(handlers::unread_count))
        .route("/read-all", post(handlers::mark_all_read))
        .route("/reminders", get(handlers::list_reminders).post(handlers::create_reminder))
        .route(
            "/reminders/{reminder_id}",
            patch(handlers::update_reminder).delete(handlers::delete_reminder),
        )
        .route("/stream", get(handlers::stream_notifications))
        .route("/{notification_id}/read", post(handlers::mark_read))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
