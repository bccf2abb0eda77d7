//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! carnet migrate
//! ```
//!
//! # Environment Variables
//!
//! - `CARNET_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`)
//!
//! Migration files live in `crates/api/migrations/` and are embedded into the
//! binary at compile time.

use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run the account database migrations.
pub async fn run() -> Result<(), MigrationError> {
    dotenvy::dotenv().ok();

    let database_url = database_url()?;

    tracing::info!("Connecting to database...");
    let pool = PgPool::connect(database_url.expose_secret()).await?;

    tracing::info!("Running migrations...");
    sqlx::migrate!("../api/migrations").run(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}

fn database_url() -> Result<SecretString, MigrationError> {
    if let Ok(value) = std::env::var("CARNET_DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(MigrationError::MissingEnvVar("CARNET_DATABASE_URL"))
}
