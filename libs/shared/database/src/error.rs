use thiserror::Error;

/// PostgREST error codes that mean "another row already holds this slot".
const UNIQUE_VIOLATION: &str = "23505";
const EXCLUSION_VIOLATION: &str = "23P01";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatabaseError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflicting row: {0}")]
    Conflict(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl DatabaseError {
    /// Classify a non-success PostgREST response.
    pub fn from_status(status: u16, body: &str) -> Self {
        if body.contains(UNIQUE_VIOLATION) || body.contains(EXCLUSION_VIOLATION) {
            return DatabaseError::Conflict(body.to_string());
        }

        match status {
            401 | 403 => DatabaseError::Auth(body.to_string()),
            404 => DatabaseError::NotFound(body.to_string()),
            409 => DatabaseError::Conflict(body.to_string()),
            _ => DatabaseError::Api {
                status,
                message: body.to_string(),
            },
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, DatabaseError::Conflict(_))
    }
}

impl From<reqwest::Error> for DatabaseError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DatabaseError::Timeout(err.to_string())
        } else if err.is_decode() {
            DatabaseError::Decode(err.to_string())
        } else {
            DatabaseError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(err: serde_json::Error) -> Self {
        DatabaseError::Decode(err.to_string())
    }
}
