use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// OAuth2 password form. `grant_type`, `scope` and friends are ignored.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Public projection of a freshly registered user.
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredUser {
    #[serde(skip_serializing)]
    pub id: Uuid,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Response returned after a successful login.
#[derive(Debug, Clone, Serialize)]
pub struct AccessToken {
    pub user_id: Uuid,
    pub email: String,
    pub token_type: &'static str,
    pub access_token: String,
}

impl AccessToken {
    pub fn bearer(user_id: Uuid, email: String, access_token: String) -> Self {
        Self {
            user_id,
            email,
            token_type: "bearer",
            access_token,
        }
    }
}
