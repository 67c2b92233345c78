use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use shared_utils::clock::Clock;
use shared_utils::timezone::format_in_timezone;

use crate::models::{
    AppointmentContext, NewNotification, NewReminder, ReminderPriority, ReminderUpdate,
    SideEffectReport, SideEffectStep,
};
use crate::store::{NotificationStore, ReminderStore};

/// Appointment-linked reminders fire this long before the appointment.
pub const REMINDER_LEAD_TIME_MINUTES: i64 = 60;

pub const BOOKED_TITLE: &str = "Appointment Booked";
pub const RESCHEDULED_TITLE: &str = "Appointment Rescheduled";
pub const CANCELLED_TITLE: &str = "Appointment Cancelled";
pub const BOOKED_REMINDER_TITLE: &str = "Reminder: Appointment Soon";
pub const UPDATED_REMINDER_TITLE: &str = "Appointment Reminder";

/// Used in messages when the doctor's name could not be loaded.
pub const UNKNOWN_DOCTOR: &str = "your doctor";

/// `Monday, January 8 at 10:00 AM UTC`
const BOOKED_TIME_FORMAT: &str = "%A, %B %-d at %-I:%M %p %Z";
/// `Jan 8, 2024, 10:00:00 AM`
const RESCHEDULED_TIME_FORMAT: &str = "%b %-d, %Y, %-I:%M:%S %p";

pub fn reminder_due(appointment_at: DateTime<Utc>) -> DateTime<Utc> {
    appointment_at - Duration::minutes(REMINDER_LEAD_TIME_MINUTES)
}

fn doctor_name(ctx: &AppointmentContext) -> &str {
    ctx.doctor_name.as_deref().unwrap_or(UNKNOWN_DOCTOR)
}

fn reminder_description(ctx: &AppointmentContext) -> String {
    format!("Reminder: Your appointment with {} is in 1 hour.", doctor_name(ctx))
}

// ==============================================================================
// COMPOSITION
// ==============================================================================

pub fn compose_booked(ctx: &AppointmentContext, now: DateTime<Utc>) -> (NewNotification, NewReminder) {
    let when = format_in_timezone(ctx.datetime, ctx.timezone, BOOKED_TIME_FORMAT);

    let notification = NewNotification {
        user_id: ctx.user_id.clone(),
        appointment_id: Some(ctx.appointment_id.clone()),
        title: BOOKED_TITLE.to_string(),
        message: format!("Your appointment with {} is booked for {}.", doctor_name(ctx), when),
        kind: None,
        created_at: now,
        read: false,
    };

    let reminder = NewReminder {
        user_id: ctx.user_id.clone(),
        appointment_id: Some(ctx.appointment_id.clone()),
        title: BOOKED_REMINDER_TITLE.to_string(),
        description: reminder_description(ctx),
        due_date: reminder_due(ctx.datetime),
        priority: ReminderPriority::Medium,
        sent: false,
        created_at: now,
    };

    (notification, reminder)
}

/// Notification, the patch for an existing reminder, and the reminder to
/// insert when none exists yet.
pub fn compose_rescheduled(
    ctx: &AppointmentContext,
    now: DateTime<Utc>,
) -> (NewNotification, ReminderUpdate, NewReminder) {
    let when = format_in_timezone(ctx.datetime, ctx.timezone, RESCHEDULED_TIME_FORMAT);

    let notification = NewNotification {
        user_id: ctx.user_id.clone(),
        appointment_id: Some(ctx.appointment_id.clone()),
        title: RESCHEDULED_TITLE.to_string(),
        message: format!("Your appointment with {} has been rescheduled to {}.", doctor_name(ctx), when),
        kind: None,
        created_at: now,
        read: false,
    };

    let update = ReminderUpdate {
        title: UPDATED_REMINDER_TITLE.to_string(),
        description: reminder_description(ctx),
        due_date: reminder_due(ctx.datetime),
        sent: false,
    };

    let fresh = NewReminder {
        user_id: ctx.user_id.clone(),
        appointment_id: Some(ctx.appointment_id.clone()),
        title: RESCHEDULED_TITLE.to_string(),
        description: reminder_description(ctx),
        due_date: reminder_due(ctx.datetime),
        priority: ReminderPriority::Medium,
        sent: false,
        created_at: now,
    };

    (notification, update, fresh)
}

pub fn compose_cancelled(ctx: &AppointmentContext, now: DateTime<Utc>) -> NewNotification {
    NewNotification {
        user_id: ctx.user_id.clone(),
        appointment_id: Some(ctx.appointment_id.clone()),
        title: CANCELLED_TITLE.to_string(),
        message: "Your appointment has been cancelled successfully.".to_string(),
        kind: Some("cancellation".to_string()),
        created_at: now,
        read: false,
    }
}

// ==============================================================================
// WRITER
// ==============================================================================

/// Writes the notifications and reminders that follow an appointment
/// mutation. Every write is independent; failures are logged and reported,
/// never returned.
pub struct SideEffectWriter {
    notifications: Arc<dyn NotificationStore>,
    reminders: Arc<dyn ReminderStore>,
    clock: Arc<dyn Clock>,
}

impl SideEffectWriter {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        reminders: Arc<dyn ReminderStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { notifications, reminders, clock }
    }

    pub async fn on_booked(&self, ctx: &AppointmentContext) -> SideEffectReport {
        let (notification, reminder) = compose_booked(ctx, self.clock.now());
        let mut report = SideEffectReport::default();

        let result = self.notifications.insert_notification(&notification).await;
        self.log_step(ctx, SideEffectStep::Notification, &result);
        report.record(SideEffectStep::Notification, &result);

        let result = self.reminders.insert_reminder(&reminder).await;
        self.log_step(ctx, SideEffectStep::ReminderInsert, &result);
        report.record(SideEffectStep::ReminderInsert, &result);

        report
    }

    /// Notifies, then moves the appointment's reminder (or creates one).
    pub async fn on_rescheduled(&self, ctx: &AppointmentContext) -> SideEffectReport {
        let (notification, update, fresh) = compose_rescheduled(ctx, self.clock.now());
        let mut report = SideEffectReport::default();

        let result = self.notifications.insert_notification(&notification).await;
        self.log_step(ctx, SideEffectStep::Notification, &result);
        report.record(SideEffectStep::Notification, &result);

        match self.reminders.update_for_appointment(&ctx.appointment_id, &update).await {
            Ok(0) => {
                let result = self.reminders.insert_reminder(&fresh).await;
                self.log_step(ctx, SideEffectStep::ReminderInsert, &result);
                report.record(SideEffectStep::ReminderInsert, &result);
            }
            Ok(updated) => {
                info!("Moved {} reminders for appointment {}", updated, ctx.appointment_id);
                report.succeeded(SideEffectStep::ReminderUpdate);
            }
            Err(e) => {
                warn!("Reminder update for appointment {} failed: {}", ctx.appointment_id, e);
                report.failed(SideEffectStep::ReminderUpdate, e);
            }
        }

        report
    }

    /// Notifies and drops the reminders of a cancelled appointment.
    pub async fn on_cancelled(&self, ctx: &AppointmentContext) -> SideEffectReport {
        let notification = compose_cancelled(ctx, self.clock.now());
        let mut report = SideEffectReport::default();

        let result = self.notifications.insert_notification(&notification).await;
        self.log_step(ctx, SideEffectStep::Notification, &result);
        report.record(SideEffectStep::Notification, &result);

        report.merge(self.remove_reminders(&ctx.appointment_id).await);
        report
    }

    pub async fn remove_reminders(&self, appointment_id: &str) -> SideEffectReport {
        let mut report = SideEffectReport::default();
        let result = self.reminders.delete_for_appointment(appointment_id).await;
        if let Err(e) = &result {
            warn!("Reminder cleanup for appointment {} failed: {}", appointment_id, e);
        }
        report.record(SideEffectStep::ReminderDelete, &result);
        report
    }

    fn log_step<T, E: std::fmt::Display>(&self, ctx: &AppointmentContext, step: SideEffectStep, result: &Result<T, E>) {
        match result {
            Ok(_) => info!("{:?} written for appointment {}", step, ctx.appointment_id),
            Err(e) => warn!("{:?} for appointment {} failed: {}", step, ctx.appointment_id, e),
        }
    }
}
