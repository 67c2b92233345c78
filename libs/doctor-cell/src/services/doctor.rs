use std::sync::Arc;

use tracing::{debug, info};

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{Doctor, DoctorError, DoctorProfile};
use crate::store::{DoctorStore, SupabaseDoctorStore};

/// Doctor directory as the portal shows it.
pub struct DoctorService {
    store: Arc<dyn DoctorStore>,
    supabase: Arc<SupabaseClient>,
    image_bucket: String,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            store: Arc::new(SupabaseDoctorStore::new(supabase.clone())),
            supabase,
            image_bucket: config.doctor_image_bucket.clone(),
        }
    }

    pub fn with_store(config: &AppConfig, store: Arc<dyn DoctorStore>) -> Self {
        Self {
            store,
            supabase: Arc::new(SupabaseClient::new(config)),
            image_bucket: config.doctor_image_bucket.clone(),
        }
    }

    pub async fn list_doctors(&self) -> Result<Vec<DoctorProfile>, DoctorError> {
        let doctors = self.store.list_doctors().await?;
        info!("Loaded {} doctors", doctors.len());
        Ok(doctors.into_iter().map(|doctor| self.to_profile(doctor)).collect())
    }

    pub async fn get_doctor(&self, doctor_id: &str) -> Result<DoctorProfile, DoctorError> {
        debug!("Fetching doctor profile: {}", doctor_id);
        let doctor = self
            .store
            .get_doctor(doctor_id)
            .await?
            .ok_or_else(|| DoctorError::NotFound(doctor_id.to_string()))?;
        Ok(self.to_profile(doctor))
    }

    fn to_profile(&self, doctor: Doctor) -> DoctorProfile {
        let image_url = doctor
            .profile_image_url
            .as_deref()
            .map(|image| self.resolve_image_url(image));
        DoctorProfile { doctor, image_url }
    }

    /// Absolute URLs pass through; anything else is a key in the image bucket.
    pub fn resolve_image_url(&self, image: &str) -> String {
        if image.starts_with("http://") || image.starts_with("https://") {
            image.to_string()
        } else {
            self.supabase.get_public_url(&self.image_bucket, image)
        }
    }
}
