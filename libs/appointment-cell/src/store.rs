use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};

use doctor_cell::{DoctorStore, SupabaseDoctorStore};
use notification_cell::{NotificationStore, ReminderStore, SupabaseNotificationStore, SupabaseReminderStore};
use shared_config::AppConfig;
use shared_database::{ChangeFeed, DatabaseError, SupabaseClient};

use crate::models::{Appointment, AppointmentError, AppointmentStatus, NewAppointment};

/// Persistence of appointment rows. Inserts and reschedules must fail with
/// `SlotNotAvailable` when the store itself detects an overlapping active row.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn get_appointment(&self, appointment_id: &str) -> Result<Option<Appointment>, AppointmentError>;

    /// Newest first.
    async fn list_for_patient(&self, user_id: &str) -> Result<Vec<Appointment>, AppointmentError>;

    /// Non-cancelled appointments of `doctor_id` starting in `[from, to)`,
    /// oldest first.
    async fn find_active_in_range(
        &self,
        doctor_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        exclude_id: Option<&str>,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    async fn insert_appointment(&self, appointment: &NewAppointment) -> Result<Appointment, AppointmentError>;

    /// Moves the appointment and marks it rescheduled.
    async fn reschedule_appointment(
        &self,
        appointment_id: &str,
        datetime: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError>;

    async fn set_status(
        &self,
        appointment_id: &str,
        status: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError>;

    async fn delete_appointment(&self, appointment_id: &str) -> Result<(), AppointmentError>;
}

/// PostgREST filter value for an instant: RFC 3339 with explicit offset.
pub fn instant_param(instant: DateTime<Utc>) -> String {
    urlencoding::encode(&instant.to_rfc3339_opts(SecondsFormat::Secs, false)).into_owned()
}

fn representation() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}

/// Overlap rejections from the exclusion constraint become `SlotNotAvailable`.
fn write_error(err: DatabaseError) -> AppointmentError {
    if err.is_conflict() {
        warn!("Store rejected overlapping appointment: {}", err);
        AppointmentError::SlotNotAvailable
    } else {
        AppointmentError::DatabaseError(err.to_string())
    }
}

fn read_error(err: DatabaseError) -> AppointmentError {
    AppointmentError::DatabaseError(err.to_string())
}

fn decode(rows: Vec<Value>) -> Result<Vec<Appointment>, AppointmentError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row)
                .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
        })
        .collect()
}

fn first(rows: Vec<Value>) -> Result<Appointment, AppointmentError> {
    decode(rows)?.into_iter().next().ok_or(AppointmentError::NotFound)
}

// ==============================================================================
// SUPABASE IMPLEMENTATION
// ==============================================================================

pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
    auth_token: Option<String>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>, auth_token: Option<&str>) -> Self {
        Self {
            supabase,
            auth_token: auth_token.map(str::to_string),
        }
    }

    fn by_id(appointment_id: &str) -> String {
        format!("/rest/v1/appointments?id=eq.{}", urlencoding::encode(appointment_id))
    }

    async fn patch(&self, appointment_id: &str, body: Value) -> Result<Appointment, AppointmentError> {
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &Self::by_id(appointment_id),
                self.auth_token.as_deref(),
                Some(body),
                Some(representation()),
            )
            .await
            .map_err(write_error)?;

        first(rows)
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn get_appointment(&self, appointment_id: &str) -> Result<Option<Appointment>, AppointmentError> {
        debug!("Fetching appointment {}", appointment_id);

        let path = format!("{}&select=*", Self::by_id(appointment_id));
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, self.auth_token.as_deref(), None)
            .await
            .map_err(read_error)?;

        Ok(decode(rows)?.into_iter().next())
    }

    async fn list_for_patient(&self, user_id: &str) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?user_id=eq.{}&select=*&order=datetime.desc",
            urlencoding::encode(user_id)
        );
        debug!("Listing appointments: {}", path);

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, self.auth_token.as_deref(), None)
            .await
            .map_err(read_error)?;

        decode(rows)
    }

    async fn find_active_in_range(
        &self,
        doctor_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        exclude_id: Option<&str>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut query_parts = vec![
            format!("doctor_id=eq.{}", urlencoding::encode(doctor_id)),
            format!("datetime=gte.{}", instant_param(from)),
            format!("datetime=lt.{}", instant_param(to)),
            format!("status={}", AppointmentStatus::active_filter()),
        ];
        if let Some(excluded) = exclude_id {
            query_parts.push(format!("id=neq.{}", urlencoding::encode(excluded)));
        }

        let path = format!(
            "/rest/v1/appointments?{}&select=*&order=datetime.asc",
            query_parts.join("&")
        );
        debug!("Appointment range query: {}", path);

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, self.auth_token.as_deref(), None)
            .await
            .map_err(read_error)?;

        decode(rows)
    }

    async fn insert_appointment(&self, appointment: &NewAppointment) -> Result<Appointment, AppointmentError> {
        let body = serde_json::to_value(appointment)
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                self.auth_token.as_deref(),
                Some(body),
                Some(representation()),
            )
            .await
            .map_err(write_error)?;

        first(rows).map_err(|_| AppointmentError::DatabaseError("Insert returned no appointment".to_string()))
    }

    async fn reschedule_appointment(
        &self,
        appointment_id: &str,
        datetime: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        self.patch(
            appointment_id,
            json!({
                "datetime": datetime.to_rfc3339_opts(SecondsFormat::Secs, false),
                "status": AppointmentStatus::Rescheduled,
            }),
        )
        .await
    }

    async fn set_status(
        &self,
        appointment_id: &str,
        status: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        self.patch(appointment_id, json!({ "status": status })).await
    }

    async fn delete_appointment(&self, appointment_id: &str) -> Result<(), AppointmentError> {
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &Self::by_id(appointment_id),
                self.auth_token.as_deref(),
                None,
                Some(representation()),
            )
            .await
            .map_err(read_error)?;

        if rows.is_empty() {
            return Err(AppointmentError::NotFound);
        }
        Ok(())
    }
}

// ==============================================================================
// STORE BUNDLE
// ==============================================================================

/// Every store an appointment mutation touches.
#[derive(Clone)]
pub struct SchedulingStores {
    pub appointments: Arc<dyn AppointmentStore>,
    pub doctors: Arc<dyn DoctorStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub reminders: Arc<dyn ReminderStore>,
}

impl SchedulingStores {
    /// Supabase-backed stores acting as the signed-in patient. Inserted
    /// notifications are published on `feed`.
    pub fn supabase(config: &AppConfig, auth_token: &str, feed: Arc<ChangeFeed>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));

        Self {
            appointments: Arc::new(SupabaseAppointmentStore::new(supabase.clone(), Some(auth_token))),
            doctors: Arc::new(SupabaseDoctorStore::with_token(supabase.clone(), auth_token)),
            notifications: Arc::new(SupabaseNotificationStore::new(supabase.clone(), auth_token).with_feed(feed)),
            reminders: Arc::new(SupabaseReminderStore::new(supabase, auth_token)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instants_keep_an_explicit_offset() {
        let instant = DateTime::parse_from_rfc3339("2024-01-08T10:00:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(instant_param(instant), "2024-01-08T10%3A00%3A00%2B00%3A00");
    }

    #[test]
    fn exclusion_violation_is_a_taken_slot() {
        let err = DatabaseError::from_status(409, r#"{"code":"23P01","message":"conflicting key value"}"#);
        assert_eq!(write_error(err), AppointmentError::SlotNotAvailable);

        let err = DatabaseError::from_status(500, "boom");
        assert!(matches!(write_error(err), AppointmentError::DatabaseError(_)));
    }
}
