pub mod auth;
pub mod error;

pub use auth::{AccessToken, JwtClaims, User};
pub use error::AppError;
