#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use appointment_cell::services::conflict::intervals_overlap;
use appointment_cell::{
    Appointment, AppointmentError, AppointmentStatus, AppointmentStore, NewAppointment, SchedulingRuntime,
    SchedulingStores,
};
use doctor_cell::{Doctor, DoctorError, DoctorStore};
use notification_cell::{
    NewNotification, NewReminder, Notification, NotificationError, NotificationFilter, NotificationStore, Reminder,
    ReminderChanges, ReminderStore, ReminderUpdate,
};
use shared_database::ChangeFeed;
use shared_models::auth::User;
use shared_utils::clock::FixedClock;

/// Every store trait over shared in-memory tables. Inserts and reschedules
/// enforce the same no-overlap rule as the database constraint.
#[derive(Default)]
pub struct InMemoryScheduling {
    pub doctors: Mutex<HashMap<String, Doctor>>,
    pub appointments: Mutex<Vec<Appointment>>,
    pub notifications: Mutex<Vec<Notification>>,
    pub reminders: Mutex<Vec<Reminder>>,
    next_id: AtomicUsize,

    pub fail_doctor_lookup: AtomicBool,
    pub fail_notifications: AtomicBool,
    pub fail_reminder_delete: AtomicBool,
    pub fail_appointment_delete: AtomicBool,
    /// Range queries see nothing, as if another booking landed after the
    /// conflict check ran.
    pub blind_range_queries: AtomicBool,
}

impl InMemoryScheduling {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_doctor(doctor: Doctor) -> Arc<Self> {
        let store = Self::new();
        store.doctors.lock().unwrap().insert(doctor.id.clone(), doctor);
        store
    }

    pub fn stores(self: &Arc<Self>) -> SchedulingStores {
        SchedulingStores {
            appointments: self.clone(),
            doctors: self.clone(),
            notifications: self.clone(),
            reminders: self.clone(),
        }
    }

    pub fn fail(flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
    }

    fn id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Seed an appointment row directly.
    pub fn seed_appointment(&self, id: &str, user_id: &str, doctor_id: &str, at: &str, status: AppointmentStatus) {
        self.appointments.lock().unwrap().push(Appointment {
            id: id.to_string(),
            user_id: user_id.to_string(),
            doctor_id: doctor_id.to_string(),
            datetime: utc(at),
            status,
            duration_minutes: 30,
            title: Some("Consultation".to_string()),
            notes: None,
            created_at: None,
            updated_at: None,
        });
    }

    pub fn appointment(&self, id: &str) -> Option<Appointment> {
        self.appointments.lock().unwrap().iter().find(|a| a.id == id).cloned()
    }

    pub fn reminders_for(&self, appointment_id: &str) -> Vec<Reminder> {
        self.reminders
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.appointment_id.as_deref() == Some(appointment_id))
            .cloned()
            .collect()
    }

    /// No two active appointments of the same doctor overlap.
    pub fn assert_no_overlaps(&self) {
        let rows = self.appointments.lock().unwrap();
        let active: Vec<_> = rows.iter().filter(|a| a.is_active()).collect();
        for (i, a) in active.iter().enumerate() {
            for b in &active[i + 1..] {
                assert!(
                    a.doctor_id != b.doctor_id || !intervals_overlap(a.datetime, a.end(), b.datetime, b.end()),
                    "{} and {} overlap",
                    a.id,
                    b.id
                );
            }
        }
    }

    fn overlaps_active(rows: &[Appointment], doctor_id: &str, start: DateTime<Utc>, end: DateTime<Utc>, skip: Option<&str>) -> bool {
        rows.iter().any(|a| {
            a.is_active()
                && a.doctor_id == doctor_id
                && skip != Some(a.id.as_str())
                && intervals_overlap(start, end, a.datetime, a.end())
        })
    }
}

#[async_trait]
impl AppointmentStore for InMemoryScheduling {
    async fn get_appointment(&self, appointment_id: &str) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.appointment(appointment_id))
    }

    async fn list_for_patient(&self, user_id: &str) -> Result<Vec<Appointment>, AppointmentError> {
        let mut rows: Vec<_> = self
            .appointments
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.datetime.cmp(&a.datetime));
        Ok(rows)
    }

    async fn find_active_in_range(
        &self,
        doctor_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        exclude_id: Option<&str>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        if self.blind_range_queries.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        let mut rows: Vec<_> = self
            .appointments
            .lock()
            .unwrap()
            .iter()
            .filter(|a| {
                a.doctor_id == doctor_id
                    && a.is_active()
                    && a.datetime >= from
                    && a.datetime < to
                    && exclude_id != Some(a.id.as_str())
            })
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.datetime);
        Ok(rows)
    }

    async fn insert_appointment(&self, new: &NewAppointment) -> Result<Appointment, AppointmentError> {
        let mut rows = self.appointments.lock().unwrap();
        let duration_minutes: i64 = new.duration.parse().unwrap();
        let end = new.datetime + chrono::Duration::minutes(duration_minutes);
        if Self::overlaps_active(&rows, &new.doctor_id, new.datetime, end, None) {
            return Err(AppointmentError::SlotNotAvailable);
        }

        let appointment = Appointment {
            id: self.id("appt"),
            user_id: new.user_id.clone(),
            doctor_id: new.doctor_id.clone(),
            datetime: new.datetime,
            status: new.status,
            duration_minutes,
            title: Some(new.title.clone()),
            notes: new.notes.clone(),
            created_at: None,
            updated_at: None,
        };
        rows.push(appointment.clone());
        Ok(appointment)
    }

    async fn reschedule_appointment(&self, appointment_id: &str, datetime: DateTime<Utc>) -> Result<Appointment, AppointmentError> {
        let mut rows = self.appointments.lock().unwrap();
        let current = rows
            .iter()
            .find(|a| a.id == appointment_id)
            .cloned()
            .ok_or(AppointmentError::NotFound)?;
        let end = datetime + chrono::Duration::minutes(current.duration_minutes);
        if Self::overlaps_active(&rows, &current.doctor_id, datetime, end, Some(appointment_id)) {
            return Err(AppointmentError::SlotNotAvailable);
        }

        let row = rows
            .iter_mut()
            .find(|a| a.id == appointment_id)
            .ok_or(AppointmentError::NotFound)?;
        row.datetime = datetime;
        row.status = AppointmentStatus::Rescheduled;
        Ok(row.clone())
    }

    async fn set_status(&self, appointment_id: &str, status: AppointmentStatus) -> Result<Appointment, AppointmentError> {
        let mut rows = self.appointments.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|a| a.id == appointment_id)
            .ok_or(AppointmentError::NotFound)?;
        row.status = status;
        Ok(row.clone())
    }

    async fn delete_appointment(&self, appointment_id: &str) -> Result<(), AppointmentError> {
        if self.fail_appointment_delete.load(Ordering::SeqCst) {
            return Err(AppointmentError::DatabaseError("appointments offline".to_string()));
        }
        let mut rows = self.appointments.lock().unwrap();
        let before = rows.len();
        rows.retain(|a| a.id != appointment_id);
        if rows.len() == before {
            return Err(AppointmentError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl DoctorStore for InMemoryScheduling {
    async fn get_doctor(&self, doctor_id: &str) -> Result<Option<Doctor>, DoctorError> {
        if self.fail_doctor_lookup.load(Ordering::SeqCst) {
            return Err(DoctorError::DatabaseError("doctors offline".to_string()));
        }
        Ok(self.doctors.lock().unwrap().get(doctor_id).cloned())
    }

    async fn list_doctors(&self) -> Result<Vec<Doctor>, DoctorError> {
        Ok(self.doctors.lock().unwrap().values().cloned().collect())
    }
}

#[async_trait]
impl NotificationStore for InMemoryScheduling {
    async fn insert_notification(&self, n: &NewNotification) -> Result<Notification, NotificationError> {
        if self.fail_notifications.load(Ordering::SeqCst) {
            return Err(NotificationError::DatabaseError("notifications offline".to_string()));
        }
        let row = Notification {
            id: self.id("notification"),
            user_id: n.user_id.clone(),
            appointment_id: n.appointment_id.clone(),
            title: n.title.clone(),
            message: n.message.clone(),
            kind: n.kind.clone(),
            read: n.read,
            created_at: n.created_at,
        };
        self.notifications.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn list_notifications(&self, user_id: &str, filter: NotificationFilter, limit: usize) -> Result<Vec<Notification>, NotificationError> {
        Ok(self
            .notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.user_id == user_id && filter.matches(n))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_notifications(&self, user_id: &str, filter: NotificationFilter) -> Result<u64, NotificationError> {
        Ok(self.list_notifications(user_id, filter, usize::MAX).await?.len() as u64)
    }

    async fn mark_read(&self, user_id: &str, notification_id: &str) -> Result<Option<Notification>, NotificationError> {
        let mut rows = self.notifications.lock().unwrap();
        Ok(rows
            .iter_mut()
            .find(|n| n.user_id == user_id && n.id == notification_id)
            .map(|n| {
                n.read = true;
                n.clone()
            }))
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<usize, NotificationError> {
        let mut updated = 0;
        for n in self.notifications.lock().unwrap().iter_mut().filter(|n| n.user_id == user_id && !n.read) {
            n.read = true;
            updated += 1;
        }
        Ok(updated)
    }
}

#[async_trait]
impl ReminderStore for InMemoryScheduling {
    async fn list_reminders(&self, user_id: &str) -> Result<Vec<Reminder>, NotificationError> {
        Ok(self.reminders.lock().unwrap().iter().filter(|r| r.user_id == user_id).cloned().collect())
    }

    async fn insert_reminder(&self, r: &NewReminder) -> Result<Reminder, NotificationError> {
        let row = Reminder {
            id: self.id("reminder"),
            user_id: r.user_id.clone(),
            appointment_id: r.appointment_id.clone(),
            title: r.title.clone(),
            description: Some(r.description.clone()),
            due_date: r.due_date,
            priority: r.priority,
            sent: r.sent,
            created_at: Some(r.created_at),
        };
        self.reminders.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn update_reminder(
        &self,
        user_id: &str,
        reminder_id: &str,
        changes: &ReminderChanges,
    ) -> Result<Option<Reminder>, NotificationError> {
        let mut rows = self.reminders.lock().unwrap();
        Ok(rows
            .iter_mut()
            .find(|r| r.id == reminder_id && r.user_id == user_id)
            .map(|reminder| {
                if let Some(title) = &changes.title {
                    reminder.title = title.clone();
                }
                if let Some(due_date) = changes.due_date {
                    reminder.due_date = due_date;
                }
                if let Some(priority) = changes.priority {
                    reminder.priority = priority;
                }
                reminder.clone()
            }))
    }

    async fn delete_reminder(&self, user_id: &str, reminder_id: &str) -> Result<bool, NotificationError> {
        let mut rows = self.reminders.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| !(r.id == reminder_id && r.user_id == user_id));
        Ok(rows.len() < before)
    }

    async fn update_for_appointment(&self, appointment_id: &str, update: &ReminderUpdate) -> Result<usize, NotificationError> {
        let mut updated = 0;
        for reminder in self
            .reminders
            .lock()
            .unwrap()
            .iter_mut()
            .filter(|r| r.appointment_id.as_deref() == Some(appointment_id))
        {
            reminder.title = update.title.clone();
            reminder.description = Some(update.description.clone());
            reminder.due_date = update.due_date;
            reminder.sent = update.sent;
            updated += 1;
        }
        Ok(updated)
    }

    async fn delete_for_appointment(&self, appointment_id: &str) -> Result<usize, NotificationError> {
        if self.fail_reminder_delete.load(Ordering::SeqCst) {
            return Err(NotificationError::DatabaseError("reminders offline".to_string()));
        }
        let mut rows = self.reminders.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| r.appointment_id.as_deref() != Some(appointment_id));
        Ok(before - rows.len())
    }
}

// ==============================================================================
// FIXTURES
// ==============================================================================

pub fn utc(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).unwrap().with_timezone(&Utc)
}

/// Mondays, 09:00–17:00 UTC, 30 minute slots.
pub fn monday_doctor() -> Doctor {
    serde_json::from_value(json!({
        "id": "doctor-1",
        "name": "Dr. Ada Smith",
        "specialty": "General Practice",
        "available_days": ["Monday"],
        "working_hours": {"start": "09:00", "end": "17:00"},
        "slot_duration_minutes": 30,
        "timezone": "UTC"
    }))
    .unwrap()
}

pub fn patient(id: &str) -> User {
    User {
        id: id.to_string(),
        email: Some(format!("{}@example.com", id)),
        role: Some("authenticated".to_string()),
        metadata: None,
        created_at: None,
    }
}

/// Runtime whose clock reads `now`.
pub fn runtime_at(now: &str) -> Arc<SchedulingRuntime> {
    Arc::new(SchedulingRuntime::with_clock(
        Arc::new(ChangeFeed::default()),
        Arc::new(FixedClock::at(utc(now))),
        "UTC",
    ))
}
