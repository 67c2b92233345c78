use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Claims carried by a Supabase access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

/// The signed-in patient, resolved from the bearer token by the auth middleware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Raw bearer token of the current request, forwarded to the store so
/// row-level security is evaluated as the caller.
#[derive(Debug, Clone)]
pub struct AccessToken(pub String);

impl AccessToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl User {
    /// Rows keyed by `user_id` belong to the user whose id matches.
    pub fn owns(&self, owner_id: &str) -> bool {
        self.id == owner_id
    }

    /// Timezone the patient saved in their profile metadata, if any.
    pub fn preferred_timezone(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.get("timezone"))
            .and_then(|value| value.as_str())
            .filter(|tz| !tz.is_empty())
    }
}
