use std::env;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DOCTOR_IMAGE_BUCKET: &str = "doctor-images";
pub const DEFAULT_API_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    /// IANA zone used when a caller does not send one.
    pub default_timezone: String,
    pub request_timeout_secs: u64,
    pub doctor_image_bucket: String,
    pub api_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            default_timezone: env::var("DEFAULT_TIMEZONE")
                .or_else(|_| env::var("TZ"))
                .unwrap_or_else(|_| {
                    warn!("DEFAULT_TIMEZONE not set, using {}", DEFAULT_TIMEZONE);
                    DEFAULT_TIMEZONE.to_string()
                }),
            request_timeout_secs: env::var("SUPABASE_TIMEOUT_SECS")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            doctor_image_bucket: env::var("DOCTOR_IMAGE_BUCKET")
                .unwrap_or_else(|_| DEFAULT_DOCTOR_IMAGE_BUCKET.to_string()),
            api_port: env::var("API_PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(DEFAULT_API_PORT),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            default_timezone: DEFAULT_TIMEZONE.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            doctor_image_bucket: DEFAULT_DOCTOR_IMAGE_BUCKET.to_string(),
            api_port: DEFAULT_API_PORT,
        }
    }
}
