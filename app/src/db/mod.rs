// app/src/db/mod.rs

pub mod pg_store;

pub use pg_store::{PgStore, PgTx};

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Opens the connection pool and, when configured, applies the embedded
/// schema migrations.
pub async fn connect(config: &AppConfig) -> Result<PgPool> {
  let pool = PgPoolOptions::new()
    .max_connections(10)
    .acquire_timeout(Duration::from_secs(5))
    .connect(&config.database_url)
    .await?;
  tracing::info!("Successfully connected to the database.");

  if config.run_migrations {
    run_migrations(&pool).await?;
    tracing::info!("Database migrations applied.");
  }
  Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
  sqlx::migrate!("./migrations")
    .run(pool)
    .await
    .map_err(|e| AppError::Sqlx(sqlx::Error::Migrate(Box::new(e))))
}
