use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use shared_database::{DatabaseError, SupabaseClient};

use crate::models::{Doctor, DoctorError};

/// Read access to the shared doctor directory.
#[async_trait]
pub trait DoctorStore: Send + Sync {
    async fn get_doctor(&self, doctor_id: &str) -> Result<Option<Doctor>, DoctorError>;

    /// All doctors ordered by name.
    async fn list_doctors(&self) -> Result<Vec<Doctor>, DoctorError>;
}

pub struct SupabaseDoctorStore {
    supabase: Arc<SupabaseClient>,
    auth_token: Option<String>,
}

impl SupabaseDoctorStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase, auth_token: None }
    }

    /// Read as the signed-in patient instead of the anonymous role.
    pub fn with_token(supabase: Arc<SupabaseClient>, auth_token: &str) -> Self {
        Self {
            supabase,
            auth_token: Some(auth_token.to_string()),
        }
    }

    fn decode(rows: Vec<Value>) -> Result<Vec<Doctor>, DoctorError> {
        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| DoctorError::DatabaseError(format!("Failed to parse doctor: {}", e)))
            })
            .collect()
    }
}

fn database_error(err: DatabaseError) -> DoctorError {
    DoctorError::DatabaseError(err.to_string())
}

#[async_trait]
impl DoctorStore for SupabaseDoctorStore {
    async fn get_doctor(&self, doctor_id: &str) -> Result<Option<Doctor>, DoctorError> {
        debug!("Fetching doctor {}", doctor_id);

        let path = format!(
            "/rest/v1/doctors?id=eq.{}&select=*",
            urlencoding::encode(doctor_id)
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, self.auth_token.as_deref(), None)
            .await
            .map_err(database_error)?;

        Ok(Self::decode(rows)?.into_iter().next())
    }

    async fn list_doctors(&self) -> Result<Vec<Doctor>, DoctorError> {
        debug!("Listing doctors");

        let rows: Vec<Value> = self
            .supabase
            .request(
                Method::GET,
                "/rest/v1/doctors?select=*&order=name.asc",
                self.auth_token.as_deref(),
                None,
            )
            .await
            .map_err(database_error)?;

        Self::decode(rows)
    }
}
