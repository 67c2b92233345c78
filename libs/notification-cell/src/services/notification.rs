use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use shared_config::AppConfig;
use shared_database::{ChangeFeed, SupabaseClient, Subscription};
use shared_utils::clock::{Clock, SystemClock};

use crate::models::{
    CreateReminderRequest, NewReminder, Notification, NotificationError, NotificationFilter, NotificationPage,
    Reminder, ReminderChanges, MAX_REMINDER_TITLE_CHARS,
};
use crate::store::{
    NotificationStore, ReminderStore, SupabaseNotificationStore, SupabaseReminderStore, NOTIFICATIONS_TABLE,
};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

pub struct NotificationService {
    notifications: Arc<dyn NotificationStore>,
    reminders: Arc<dyn ReminderStore>,
    clock: Arc<dyn Clock>,
}

impl NotificationService {
    pub fn new(config: &AppConfig, auth_token: &str) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self::with_stores(
            Arc::new(SupabaseNotificationStore::new(supabase.clone(), auth_token)),
            Arc::new(SupabaseReminderStore::new(supabase, auth_token)),
        )
    }

    pub fn with_stores(notifications: Arc<dyn NotificationStore>, reminders: Arc<dyn ReminderStore>) -> Self {
        Self {
            notifications,
            reminders,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// One page of the user's notifications plus whether more exist.
    pub async fn list(
        &self,
        user_id: &str,
        filter: NotificationFilter,
        limit: Option<usize>,
    ) -> Result<NotificationPage, NotificationError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        debug!("Listing {:?} notifications for {} (limit {})", filter, user_id, limit);

        let notifications = self.notifications.list_notifications(user_id, filter, limit).await?;
        let total = self.notifications.count_notifications(user_id, filter).await?;

        Ok(NotificationPage {
            has_more: total > notifications.len() as u64,
            notifications,
            total,
        })
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<u64, NotificationError> {
        self.notifications.count_notifications(user_id, NotificationFilter::Unread).await
    }

    pub async fn mark_read(&self, user_id: &str, notification_id: &str) -> Result<Notification, NotificationError> {
        self.notifications
            .mark_read(user_id, notification_id)
            .await?
            .ok_or(NotificationError::NotFound)
    }

    pub async fn mark_all_read(&self, user_id: &str) -> Result<usize, NotificationError> {
        self.notifications.mark_all_read(user_id).await
    }

    pub async fn list_reminders(&self, user_id: &str) -> Result<Vec<Reminder>, NotificationError> {
        self.reminders.list_reminders(user_id).await
    }

    // ==============================================================================
    // PATIENT REMINDERS
    // ==============================================================================

    /// Creates a reminder of the user's own, unlinked to any appointment.
    pub async fn create_reminder(
        &self,
        user_id: &str,
        request: CreateReminderRequest,
    ) -> Result<Reminder, NotificationError> {
        let now = self.clock.now();
        let title = validate_title(&request.title)?;
        ensure_due_in_future(request.due_date, now)?;

        let reminder = NewReminder {
            user_id: user_id.to_string(),
            appointment_id: None,
            title,
            description: request.description.as_deref().map(str::trim).unwrap_or_default().to_string(),
            due_date: request.due_date,
            priority: request.priority,
            sent: false,
            created_at: now,
        };

        let created = self.reminders.insert_reminder(&reminder).await?;
        info!("Created reminder {} for user {}", created.id, user_id);
        Ok(created)
    }

    /// Applies `changes` to one of the user's reminders. Moving the due date
    /// re-arms the reminder.
    pub async fn update_reminder(
        &self,
        user_id: &str,
        reminder_id: &str,
        mut changes: ReminderChanges,
    ) -> Result<Reminder, NotificationError> {
        if changes.is_empty() {
            return Err(NotificationError::ValidationError("No reminder fields to update".to_string()));
        }
        if let Some(title) = changes.title.as_deref() {
            changes.title = Some(validate_title(title)?);
        }
        if let Some(description) = changes.description.as_mut() {
            *description = description.trim().to_string();
        }
        if let Some(due_date) = changes.due_date {
            ensure_due_in_future(due_date, self.clock.now())?;
            changes.sent = Some(false);
        }

        let updated = self
            .reminders
            .update_reminder(user_id, reminder_id, &changes)
            .await?
            .ok_or(NotificationError::ReminderNotFound)?;
        info!("Updated reminder {} for user {}", reminder_id, user_id);
        Ok(updated)
    }

    pub async fn delete_reminder(&self, user_id: &str, reminder_id: &str) -> Result<(), NotificationError> {
        if !self.reminders.delete_reminder(user_id, reminder_id).await? {
            return Err(NotificationError::ReminderNotFound);
        }
        info!("Deleted reminder {} for user {}", reminder_id, user_id);
        Ok(())
    }
}

fn validate_title(title: &str) -> Result<String, NotificationError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(NotificationError::ValidationError("Title is required".to_string()));
    }
    if title.chars().count() > MAX_REMINDER_TITLE_CHARS {
        return Err(NotificationError::ValidationError(format!(
            "Title must be at most {} characters",
            MAX_REMINDER_TITLE_CHARS
        )));
    }
    Ok(title.to_string())
}

fn ensure_due_in_future(due_date: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), NotificationError> {
    if due_date <= now {
        return Err(NotificationError::ValidationError("Due date must be in the future".to_string()));
    }
    Ok(())
}

/// Live feed of notifications addressed to `user_id`.
pub async fn subscribe_to_user_notifications(feed: &ChangeFeed, user_id: &str) -> Subscription {
    let user_id = user_id.to_string();
    feed.subscribe(NOTIFICATIONS_TABLE, move |row: &Value| {
        row.get("user_id").and_then(Value::as_str) == Some(user_id.as_str())
    })
    .await
}
