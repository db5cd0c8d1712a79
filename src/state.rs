use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    auth::{
        jwt::JwtKeys,
        repo::{PgUserStore, UserStore},
    },
    config::AppConfig,
    expenses::repo::{ExpenseStore, PgExpenseStore},
};

/// Application context built once at startup and shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jwt: JwtKeys,
    pub users: Arc<dyn UserStore>,
    pub expenses: Arc<dyn ExpenseStore>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;

        Ok(Self::with_pool(config, db))
    }

    pub fn with_pool(config: AppConfig, db: PgPool) -> Self {
        Self::from_parts(
            config,
            Arc::new(PgUserStore::new(db.clone())),
            Arc::new(PgExpenseStore::new(db)),
        )
    }

    pub fn from_parts(
        config: AppConfig,
        users: Arc<dyn UserStore>,
        expenses: Arc<dyn ExpenseStore>,
    ) -> Self {
        Self {
            jwt: JwtKeys::from_config(&config.jwt),
            config: Arc::new(config),
            users,
            expenses,
        }
    }

    pub fn secure_cookies(&self) -> bool {
        self.config.is_production()
    }
}
