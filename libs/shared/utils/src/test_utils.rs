//! Fixtures shared by the cells' test suites.

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub default_timezone: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            default_timezone: "UTC".to_string(),
        }
    }
}

impl TestConfig {
    /// Point the store at a mock server.
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            default_timezone: self.default_timezone.clone(),
            request_timeout_secs: 2,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self::patient("patient@example.com")
    }
}

impl TestUser {
    pub fn patient(email: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: "authenticated".to_string(),
        }
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "aud": "authenticated",
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token".to_string()
    }
}

/// PostgREST rows as the portal tables return them.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    /// Mondays and Wednesdays, 09:00–17:00, 30 minute slots.
    pub fn doctor_row(doctor_id: &str) -> Value {
        json!({
            "id": doctor_id,
            "name": "Dr. Ada Smith",
            "specialty": "General Practice",
            "available_days": ["Monday", "Wednesday"],
            "working_hours": {"start": "09:00", "end": "17:00"},
            "slot_duration_minutes": 30,
            "timezone": "UTC",
            "profile_image_url": "dr-smith.png",
            "location": "Main Clinic",
            "bio": null
        })
    }

    pub fn appointment_row(appointment_id: &str, user_id: &str, doctor_id: &str, datetime: &str, status: &str) -> Value {
        json!({
            "id": appointment_id,
            "user_id": user_id,
            "doctor_id": doctor_id,
            "datetime": datetime,
            "status": status,
            "duration": "30",
            "title": "Consultation",
            "notes": null,
            "created_at": "2024-01-01T00:00:00+00:00",
            "updated_at": "2024-01-01T00:00:00+00:00"
        })
    }

    pub fn notification_row(user_id: &str, title: &str, read: bool) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "user_id": user_id,
            "appointment_id": null,
            "title": title,
            "message": format!("{} message", title),
            "read": read,
            "created_at": "2024-01-01T00:00:00+00:00"
        })
    }

    pub fn reminder_row(user_id: &str, appointment_id: &str, due_date: &str) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "user_id": user_id,
            "appointment_id": appointment_id,
            "title": "Reminder: Appointment Soon",
            "description": "Reminder: Your appointment with Dr. Ada Smith is in 1 hour.",
            "due_date": due_date,
            "priority": "medium",
            "sent": false,
            "created_at": "2024-01-01T00:00:00+00:00"
        })
    }

    pub fn error_response(message: &str, code: &str) -> Value {
        json!({
            "code": code,
            "message": message,
            "details": null,
            "hint": null
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.supabase_anon_key, "test-anon-key");
        assert!(!app_config.supabase_jwt_secret.is_empty());
        assert_eq!(app_config.default_timezone, "UTC");
    }

    #[test]
    fn test_user_creation() {
        let user = TestUser::patient("someone@example.com");
        let user_model = user.to_user();
        assert_eq!(user_model.email, Some(user.email.clone()));
        assert_eq!(user_model.id, user.id);
    }

    #[test]
    fn test_jwt_token_creation() {
        let token = JwtTestUtils::create_test_token(&TestUser::default(), "test-secret", Some(1));
        assert_eq!(token.split('.').count(), 3);
    }
}
