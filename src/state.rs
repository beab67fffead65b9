use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::{
    jwt::JwtKeys,
    memory::InMemoryCredentialStore,
    repo::{CredentialStore, PgCredentialStore},
    services::AuthService,
};
use crate::config::{AppConfig, StoreKind};
use crate::db;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        let keys = JwtKeys::from_config(&config.jwt)?;

        let store: Arc<dyn CredentialStore> = match config.store {
            StoreKind::Postgres => {
                let pool = db::connect(&config).await?;
                db::migrate(&pool).await?;
                Arc::new(PgCredentialStore::new(pool))
            }
            StoreKind::Memory => {
                tracing::warn!("using in-memory credential store; users are lost on restart");
                Arc::new(InMemoryCredentialStore::new())
            }
        };

        Self::from_parts(Arc::new(config), store, keys)
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn CredentialStore>,
        keys: JwtKeys,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            config,
            auth: Arc::new(AuthService::new(store, keys)?),
        })
    }

    #[cfg(test)]
    pub fn fake(store: Arc<dyn CredentialStore>) -> Self {
        use crate::config::JwtConfig;

        let config = Arc::new(AppConfig {
            store: StoreKind::Memory,
            database_url: None,
            db_max_connections: 1,
            jwt: JwtConfig {
                secret: "test".into(),
                algorithm: "HS256".into(),
                ttl_minutes: 120,
            },
        });
        let keys = JwtKeys::from_config(&config.jwt).expect("test keys");
        Self::from_parts(config, store, keys).expect("test state")
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}
