use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::auth::{
    jwt::JwtKeys,
    password::PasswordHasher,
    repo::{PgUserStore, UserStore},
    services::AuthService,
};
use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
}

impl AppState {
    /// Connects to Postgres and wires the auth service. Returns the pool too
    /// so `main` can run migrations on it.
    pub async fn init(config: &AppConfig) -> anyhow::Result<(Self, PgPool)> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let store = Arc::new(PgUserStore::new(db.clone())) as Arc<dyn UserStore>;
        let state = Self::from_parts(store, config)?;
        Ok((state, db))
    }

    pub fn from_parts(store: Arc<dyn UserStore>, config: &AppConfig) -> anyhow::Result<Self> {
        let keys = JwtKeys::from_config(&config.jwt);
        let hasher = PasswordHasher::new(&config.password)?;
        Ok(Self {
            auth: Arc::new(AuthService::new(store, keys, hasher)?),
        })
    }

    #[cfg(test)]
    pub fn fake() -> (Self, Arc<crate::auth::memory::MemoryUserStore>) {
        let (service, store) = crate::auth::services::test_service();
        (
            Self {
                auth: Arc::new(service),
            },
            store,
        )
    }
}
