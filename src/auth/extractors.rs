use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::auth::{errors::AuthError, repo_types::User};
use crate::state::AppState;

/// The user resolved from the request's bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Pulls the token out of `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Resolves the bearer token to a user and stores it in request extensions.
pub async fn require_current_user(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let Some(token) = bearer_token(request.headers()).map(str::to_owned) else {
        warn!("missing or malformed Authorization header");
        return Err(AuthError::Unauthenticated);
    };

    let user = state.auth.resolve_current_user(&token).await.map_err(|e| {
        if matches!(e, AuthError::Unauthenticated) {
            warn!("bearer token rejected");
        }
        e
    })?;

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AuthError::Unauthenticated)
    }
}
