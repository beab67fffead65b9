use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::auth::repo::StoreError;

pub type AuthResult<T> = Result<T, AuthError>;

/// Outcomes of the authentication core that callers must handle.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("Email already registered")]
    DuplicateEmail,

    /// Unknown email and wrong password look the same.
    #[error("Incorrect username or password")]
    InvalidCredentials,

    /// Missing, invalid, expired or orphaned bearer token.
    #[error("Could not validate credentials")]
    Unauthenticated,

    #[error("An internal server error occurred")]
    StoreUnavailable(#[source] anyhow::Error),

    #[error("An internal server error occurred")]
    Internal(#[source] anyhow::Error),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::DuplicateEmail => StatusCode::CONFLICT,
            AuthError::InvalidCredentials | AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::StoreUnavailable(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => AuthError::DuplicateEmail,
            StoreError::Unavailable(inner) => AuthError::StoreUnavailable(inner),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::StoreUnavailable(inner) => error!(error = %inner, "credential store failure"),
            AuthError::Internal(inner) => error!(error = %inner, "internal auth failure"),
            _ => {}
        }

        let status = self.status_code();
        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: status.as_u16(),
        });
        let mut res = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            res.headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        res
    }
}
