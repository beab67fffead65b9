use std::sync::Arc;

use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::auth::{
    dto::{AccessToken, RegisteredUser},
    errors::{AuthError, AuthResult},
    jwt::JwtKeys,
    password::{hash_password, verify_password},
    repo::CredentialStore,
    repo_types::User,
};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PASSWORD_LEN: usize = 128;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

fn validate_registration(email: &str, password: &str) -> AuthResult<()> {
    if !is_valid_email(email) {
        return Err(AuthError::Validation("Invalid email".into()));
    }
    let len = password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(AuthError::Validation(format!(
            "Password must be between {MIN_PASSWORD_LEN} and {MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Registration, login and session resolution over a credential store.
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    keys: JwtKeys,
    // Verified against when the email is unknown so both login failures cost a hash check.
    dummy_hash: String,
}

impl AuthService {
    pub fn new(store: Arc<dyn CredentialStore>, keys: JwtKeys) -> anyhow::Result<Self> {
        let dummy_hash = hash_password("not-a-real-password").context("build dummy password hash")?;
        Ok(Self {
            store,
            keys,
            dummy_hash,
        })
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    pub async fn register(&self, email: &str, password: &str) -> AuthResult<RegisteredUser> {
        if let Err(e) = validate_registration(email, password) {
            warn!(error = %e, "registration rejected");
            return Err(e);
        }

        let hash = hash_password(password).map_err(AuthError::Internal)?;
        let user = self
            .store
            .create(email, &hash, OffsetDateTime::now_utc())
            .await
            .map_err(|e| {
                warn!(error = %e, "create user failed");
                AuthError::from(e)
            })?;

        info!(user_id = %user.id, "user registered");
        Ok(RegisteredUser {
            id: user.id,
            email: user.email,
            created_at: user.created_at,
        })
    }

    pub async fn login(&self, username: &str, password: &str) -> AuthResult<AccessToken> {
        let user = match self.store.find_by_email(username).await? {
            Some(u) => u,
            None => {
                let _ = verify_password(password, &self.dummy_hash);
                warn!("login unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !verify_password(password, &user.password_hash) {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.keys.issue(&user.email).map_err(AuthError::Internal)?;
        info!(user_id = %user.id, "user logged in");
        Ok(AccessToken::bearer(user.id, user.email, token))
    }

    /// Maps a bearer token back to its user. The subject claim alone is never
    /// trusted: the user must still exist in the store.
    pub async fn resolve_current_user(&self, token: &str) -> AuthResult<User> {
        let subject = self
            .keys
            .verify(token)
            .map_err(|_| AuthError::Unauthenticated)?;

        match self.store.find_by_email(&subject).await? {
            Some(user) => Ok(user),
            None => {
                debug!("token subject has no matching user");
                Err(AuthError::Unauthenticated)
            }
        }
    }
}
