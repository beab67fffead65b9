use anyhow::{anyhow, Context};

/// Access tokens live for two hours unless overridden.
pub const DEFAULT_TTL_MINUTES: i64 = 120;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: String,
    pub ttl_minutes: i64,
}

/// Which credential store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreKind,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source. Signing key and algorithm
    /// are mandatory.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = match lookup("STORE").as_deref() {
            None | Some("postgres") => StoreKind::Postgres,
            Some("memory") => StoreKind::Memory,
            Some(other) => return Err(anyhow!("unknown STORE `{other}`")),
        };

        let database_url = lookup("DATABASE_URL").or_else(|| lookup("DB_URL"));
        if store == StoreKind::Postgres && database_url.is_none() {
            return Err(anyhow!("DATABASE_URL (or DB_URL) must be set"));
        }

        let secret = lookup("SECRET_KEY")
            .filter(|s| !s.is_empty())
            .context("SECRET_KEY must be set")?;
        let algorithm = lookup("ALGORITHM")
            .filter(|s| !s.is_empty())
            .context("ALGORITHM must be set")?;

        let ttl_minutes = match lookup("ACCESS_TOKEN_TTL_MINUTES") {
            Some(v) => v
                .parse::<i64>()
                .ok()
                .filter(|m| *m > 0)
                .with_context(|| format!("invalid ACCESS_TOKEN_TTL_MINUTES `{v}`"))?,
            None => DEFAULT_TTL_MINUTES,
        };

        let db_max_connections = lookup("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);

        Ok(Self {
            store,
            database_url,
            db_max_connections,
            jwt: JwtConfig {
                secret,
                algorithm,
                ttl_minutes,
            },
        })
    }
}
