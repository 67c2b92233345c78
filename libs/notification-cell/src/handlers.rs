use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use shared_config::AppConfig;
use shared_database::ChangeFeed;
use shared_models::auth::{AccessToken, User};
use shared_models::error::AppError;

use crate::models::{CreateReminderRequest, NotificationFilter, ReminderChanges};
use crate::services::notification::{subscribe_to_user_notifications, NotificationService};
use crate::store::NOTIFICATIONS_TABLE;

#[derive(Debug, Deserialize)]
pub struct NotificationListQuery {
    #[serde(default)]
    pub filter: NotificationFilter,
    pub limit: Option<usize>,
}

#[axum::debug_handler]
pub async fn list_notifications(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Extension(token): Extension<AccessToken>,
    Query(query): Query<NotificationListQuery>,
) -> Result<Json<Value>, AppError> {
    let service = NotificationService::new(&state, token.as_str());

    let page = service.list(&user.id, query.filter, query.limit).await?;

    Ok(Json(json!(page)))
}

#[axum::debug_handler]
pub async fn unread_count(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Extension(token): Extension<AccessToken>,
) -> Result<Json<Value>, AppError> {
    let service = NotificationService::new(&state, token.as_str());

    let unread = service.unread_count(&user.id).await?;

    Ok(Json(json!({ "unread": unread })))
}

#[axum::debug_handler]
pub async fn mark_read(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Extension(token): Extension<AccessToken>,
    Path(notification_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let service = NotificationService::new(&state, token.as_str());

    let notification = service.mark_read(&user.id, &notification_id).await?;

    Ok(Json(json!(notification)))
}

#[axum::debug_handler]
pub async fn mark_all_read(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Extension(token): Extension<AccessToken>,
) -> Result<Json<Value>, AppError> {
    let service = NotificationService::new(&state, token.as_str());

    let updated = service.mark_all_read(&user.id).await?;

    Ok(Json(json!({ "updated": updated })))
}

#[axum::debug_handler]
pub async fn list_reminders(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Extension(token): Extension<AccessToken>,
) -> Result<Json<Value>, AppError> {
    let service = NotificationService::new(&state, token.as_str());

    let reminders = service.list_reminders(&user.id).await?;

    Ok(Json(json!({
        "reminders": reminders,
        "total": reminders.len()
    })))
}

#[axum::debug_handler]
pub async fn create_reminder(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Extension(token): Extension<AccessToken>,
    Json(request): Json<CreateReminderRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = NotificationService::new(&state, token.as_str());

    let reminder = service.create_reminder(&user.id, request).await?;

    Ok((StatusCode::CREATED, Json(json!(reminder))))
}

#[axum::debug_handler]
pub async fn update_reminder(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Extension(token): Extension<AccessToken>,
    Path(reminder_id): Path<String>,
    Json(changes): Json<ReminderChanges>,
) -> Result<Json<Value>, AppError> {
    let service = NotificationService::new(&state, token.as_str());

    let reminder = service.update_reminder(&user.id, &reminder_id, changes).await?;

    Ok(Json(json!(reminder)))
}

#[axum::debug_handler]
pub async fn delete_reminder(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Extension(token): Extension<AccessToken>,
    Path(reminder_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let service = NotificationService::new(&state, token.as_str());

    service.delete_reminder(&user.id, &reminder_id).await?;

    Ok(Json(json!({
        "message": "Reminder deleted",
        "reminder_id": reminder_id
    })))
}

/// Server-sent events carrying each new notification for the caller. The
/// subscription ends when the client disconnects.
pub async fn stream_notifications(
    Extension(user): Extension<User>,
    Extension(feed): Extension<Arc<ChangeFeed>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let subscription = subscribe_to_user_notifications(&feed, &user.id).await;
    info!(
        "User {} subscribed to notifications ({} live streams)",
        user.id,
        feed.subscriber_count(NOTIFICATIONS_TABLE).await
    );

    let events = subscription
        .into_stream()
        .map(|change| Event::default().event("notification").json_data(change.record));

    Sse::new(events).keep_alive(KeepAlive::default())
}
