use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};

use shared_database::{ChangeFeed, DatabaseError, SupabaseClient};

use crate::models::{
    NewNotification, NewReminder, Notification, NotificationError, NotificationFilter, Reminder,
    ReminderChanges, ReminderUpdate,
};

pub const NOTIFICATIONS_TABLE: &str = "notifications";

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(&self, notification: &NewNotification) -> Result<Notification, NotificationError>;

    /// Newest first, at most `limit` rows.
    async fn list_notifications(
        &self,
        user_id: &str,
        filter: NotificationFilter,
        limit: usize,
    ) -> Result<Vec<Notification>, NotificationError>;

    async fn count_notifications(&self, user_id: &str, filter: NotificationFilter) -> Result<u64, NotificationError>;

    /// `None` when the notification does not exist or is not the user's.
    async fn mark_read(&self, user_id: &str, notification_id: &str) -> Result<Option<Notification>, NotificationError>;

    /// Number of notifications flipped to read.
    async fn mark_all_read(&self, user_id: &str) -> Result<usize, NotificationError>;
}

#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// Ordered by due date.
    async fn list_reminders(&self, user_id: &str) -> Result<Vec<Reminder>, NotificationError>;

    async fn insert_reminder(&self, reminder: &NewReminder) -> Result<Reminder, NotificationError>;

    /// `None` when the reminder does not exist or is not the user's.
    async fn update_reminder(
        &self,
        user_id: &str,
        reminder_id: &str,
        changes: &ReminderChanges,
    ) -> Result<Option<Reminder>, NotificationError>;

    /// Whether one of the user's reminders was removed.
    async fn delete_reminder(&self, user_id: &str, reminder_id: &str) -> Result<bool, NotificationError>;

    /// Patches every reminder linked to the appointment; returns how many.
    async fn update_for_appointment(
        &self,
        appointment_id: &str,
        update: &ReminderUpdate,
    ) -> Result<usize, NotificationError>;

    async fn delete_for_appointment(&self, appointment_id: &str) -> Result<usize, NotificationError>;
}

fn representation() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}

fn database_error(err: DatabaseError) -> NotificationError {
    NotificationError::DatabaseError(err.to_string())
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>, what: &str) -> Result<Vec<T>, NotificationError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row)
                .map_err(|e| NotificationError::DatabaseError(format!("Failed to parse {}: {}", what, e)))
        })
        .collect()
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, NotificationError> {
    serde_json::to_value(value).map_err(|e| NotificationError::DatabaseError(e.to_string()))
}

// ==============================================================================
// SUPABASE NOTIFICATIONS
// ==============================================================================

pub struct SupabaseNotificationStore {
    supabase: Arc<SupabaseClient>,
    auth_token: String,
    feed: Option<Arc<ChangeFeed>>,
}

impl SupabaseNotificationStore {
    pub fn new(supabase: Arc<SupabaseClient>, auth_token: &str) -> Self {
        Self {
            supabase,
            auth_token: auth_token.to_string(),
            feed: None,
        }
    }

    /// Publish every inserted notification on `feed`.
    pub fn with_feed(mut self, feed: Arc<ChangeFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    fn user_path(user_id: &str, filter: NotificationFilter) -> String {
        format!(
            "/rest/v1/notifications?user_id=eq.{}{}",
            urlencoding::encode(user_id),
            filter.query_fragment()
        )
    }
}

#[async_trait]
impl NotificationStore for SupabaseNotificationStore {
    async fn insert_notification(&self, notification: &NewNotification) -> Result<Notification, NotificationError> {
        debug!("Inserting notification '{}' for user {}", notification.title, notification.user_id);

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/notifications",
                Some(&self.auth_token),
                Some(encode(notification)?),
                Some(representation()),
            )
            .await
            .map_err(database_error)?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| NotificationError::DatabaseError("Insert returned no notification".to_string()))?;

        if let Some(feed) = &self.feed {
            feed.publish_insert(NOTIFICATIONS_TABLE, row.clone()).await;
        }

        serde_json::from_value(row)
            .map_err(|e| NotificationError::DatabaseError(format!("Failed to parse notification: {}", e)))
    }

    async fn list_notifications(
        &self,
        user_id: &str,
        filter: NotificationFilter,
        limit: usize,
    ) -> Result<Vec<Notification>, NotificationError> {
        let path = format!(
            "{}&order=created_at.desc&limit={}",
            Self::user_path(user_id, filter),
            limit
        );
        debug!("Listing notifications: {}", path);

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(&self.auth_token), None)
            .await
            .map_err(database_error)?;

        decode_rows(rows, "notification")
    }

    async fn count_notifications(&self, user_id: &str, filter: NotificationFilter) -> Result<u64, NotificationError> {
        self.supabase
            .count(&Self::user_path(user_id, filter), Some(&self.auth_token))
            .await
            .map_err(database_error)
    }

    async fn mark_read(&self, user_id: &str, notification_id: &str) -> Result<Option<Notification>, NotificationError> {
        let path = format!(
            "/rest/v1/notifications?id=eq.{}&user_id=eq.{}",
            urlencoding::encode(notification_id),
            urlencoding::encode(user_id)
        );

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(&self.auth_token),
                Some(json!({ "read": true })),
                Some(representation()),
            )
            .await
            .map_err(database_error)?;

        Ok(decode_rows(rows, "notification")?.into_iter().next())
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<usize, NotificationError> {
        let path = Self::user_path(user_id, NotificationFilter::Unread);

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(&self.auth_token),
                Some(json!({ "read": true })),
                Some(representation()),
            )
            .await
            .map_err(database_error)?;

        info!("Marked {} notifications read for user {}", rows.len(), user_id);
        Ok(rows.len())
    }
}

// ==============================================================================
// SUPABASE REMINDERS
// ==============================================================================

pub struct SupabaseReminderStore {
    supabase: Arc<SupabaseClient>,
    auth_token: String,
}

impl SupabaseReminderStore {
    pub fn new(supabase: Arc<SupabaseClient>, auth_token: &str) -> Self {
        Self {
            supabase,
            auth_token: auth_token.to_string(),
        }
    }

    fn appointment_path(appointment_id: &str) -> String {
        format!("/rest/v1/reminders?appointment_id=eq.{}", urlencoding::encode(appointment_id))
    }

    fn owned_path(user_id: &str, reminder_id: &str) -> String {
        format!(
            "/rest/v1/reminders?id=eq.{}&user_id=eq.{}",
            urlencoding::encode(reminder_id),
            urlencoding::encode(user_id)
        )
    }
}

#[async_trait]
impl ReminderStore for SupabaseReminderStore {
    async fn list_reminders(&self, user_id: &str) -> Result<Vec<Reminder>, NotificationError> {
        let path = format!(
            "/rest/v1/reminders?user_id=eq.{}&order=due_date.asc",
            urlencoding::encode(user_id)
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(&self.auth_token), None)
            .await
            .map_err(database_error)?;

        decode_rows(rows, "reminder")
    }

    async fn insert_reminder(&self, reminder: &NewReminder) -> Result<Reminder, NotificationError> {
        debug!("Inserting reminder due {} for user {}", reminder.due_date, reminder.user_id);

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/reminders",
                Some(&self.auth_token),
                Some(encode(reminder)?),
                Some(representation()),
            )
            .await
            .map_err(database_error)?;

        decode_rows(rows, "reminder")?
            .into_iter()
            .next()
            .ok_or_else(|| NotificationError::DatabaseError("Insert returned no reminder".to_string()))
    }

    async fn update_reminder(
        &self,
        user_id: &str,
        reminder_id: &str,
        changes: &ReminderChanges,
    ) -> Result<Option<Reminder>, NotificationError> {
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &Self::owned_path(user_id, reminder_id),
                Some(&self.auth_token),
                Some(encode(changes)?),
                Some(representation()),
            )
            .await
            .map_err(database_error)?;

        Ok(decode_rows(rows, "reminder")?.into_iter().next())
    }

    async fn delete_reminder(&self, user_id: &str, reminder_id: &str) -> Result<bool, NotificationError> {
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &Self::owned_path(user_id, reminder_id),
                Some(&self.auth_token),
                None,
                Some(representation()),
            )
            .await
            .map_err(database_error)?;

        Ok(!rows.is_empty())
    }

    async fn update_for_appointment(
        &self,
        appointment_id: &str,
        update: &ReminderUpdate,
    ) -> Result<usize, NotificationError> {
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &Self::appointment_path(appointment_id),
                Some(&self.auth_token),
                Some(encode(update)?),
                Some(representation()),
            )
            .await
            .map_err(database_error)?;

        Ok(rows.len())
    }

    async fn delete_for_appointment(&self, appointment_id: &str) -> Result<usize, NotificationError> {
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &Self::appointment_path(appointment_id),
                Some(&self.auth_token),
                None,
                Some(representation()),
            )
            .await
            .map_err(database_error)?;

        debug!("Deleted {} reminders for appointment {}", rows.len(), appointment_id);
        Ok(rows.len())
    }
}
