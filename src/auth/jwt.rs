use std::str::FromStr;

use anyhow::{anyhow, Context};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use super::claims::Claims;
use crate::config::JwtConfig;

/// Returned for every token that fails verification, whatever the cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid or expired token")]
pub struct InvalidToken;

/// Signing material, built once at startup and shared read-only.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    ttl: Duration,
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtKeys")
            .field("algorithm", &self.algorithm)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> anyhow::Result<Self> {
        if cfg.secret.is_empty() {
            return Err(anyhow!("jwt signing secret is empty"));
        }
        let algorithm = Algorithm::from_str(&cfg.algorithm)
            .with_context(|| format!("unknown jwt algorithm `{}`", cfg.algorithm))?;
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(anyhow!(
                "jwt algorithm `{}` is not a symmetric HMAC algorithm",
                cfg.algorithm
            ));
        }
        if cfg.ttl_minutes <= 0 {
            return Err(anyhow!("jwt ttl must be positive"));
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            algorithm,
            ttl: Duration::minutes(cfg.ttl_minutes),
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Signs a token for `subject` that expires after the configured TTL.
    pub fn issue(&self, subject: &str) -> anyhow::Result<String> {
        self.issue_at(subject, OffsetDateTime::now_utc())
    }

    pub(crate) fn issue_at(&self, subject: &str, now: OffsetDateTime) -> anyhow::Result<String> {
        let exp = now + self.ttl;
        let claims = Claims {
            sub: subject.to_owned(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
        };
        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding)?;
        debug!(alg = ?self.algorithm, exp = claims.exp, "jwt signed");
        Ok(token)
    }

    /// Verifies signature and expiry, returning the subject claim.
    pub fn verify(&self, token: &str) -> Result<String, InvalidToken> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            debug!(kind = ?e.kind(), "jwt rejected");
            InvalidToken
        })?;
        // jsonwebtoken still accepts exp == now
        if data.claims.exp as i64 <= OffsetDateTime::now_utc().unix_timestamp() {
            debug!("jwt expired at boundary");
            return Err(InvalidToken);
        }
        Ok(data.claims.sub)
    }
}
