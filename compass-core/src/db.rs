use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CompassConfig, DatabaseConfig};
use crate::embeddings::{create_encoder, Encoder};
use crate::error::CompassError;
use crate::pg_store::PgResumeStore;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPoolOptions};
use sqlx::{Connection, PgPool};

/// Database used to create the application database.
const MAINTENANCE_DATABASE: &str = "postgres";

/// One pool per process; callers clone the handle, never reconnect per call.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
        .connect(&config.url)
        .await
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

pub async fn check_pgvector(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) =
        sqlx::query_as("SELECT extversion FROM pg_extension WHERE extname = 'vector'")
            .fetch_one(pool)
            .await?;
    Ok(row.0)
}

/// Create the database named in `config.url` when the server does not have it.
///
/// Connects to the `postgres` maintenance database with the same credentials.
/// Returns true when the database was created.
pub async fn ensure_database(config: &DatabaseConfig) -> Result<bool, CompassError> {
    let options = PgConnectOptions::from_str(&config.url)?;
    let name = options
        .get_database()
        .unwrap_or(MAINTENANCE_DATABASE)
        .to_string();
    let quoted = quote_database_name(&name)?;

    let mut conn = tokio::time::timeout(
        Duration::from_secs(config.acquire_timeout_seconds),
        PgConnection::connect_with(&options.database(MAINTENANCE_DATABASE)),
    )
    .await
    .map_err(|_| CompassError::Other(format!("timed out connecting to {MAINTENANCE_DATABASE}")))??;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_database WHERE datname = $1)")
            .bind(&name)
            .fetch_one(&mut conn)
            .await?;
    if !exists {
        sqlx::query(&format!("CREATE DATABASE {quoted}"))
            .execute(&mut conn)
            .await?;
        tracing::info!(database = %name, "Created database");
    } else {
        tracing::debug!(database = %name, "Database already exists");
    }
    conn.close().await?;
    Ok(!exists)
}

/// Double-quoted identifier for `CREATE DATABASE`, which takes no bind parameters.
pub fn quote_database_name(name: &str) -> Result<String, CompassError> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(CompassError::Other(format!("invalid database name '{name}'")));
    }
    Ok(format!("\"{name}\""))
}

/// Pool plus store wired from one config, as both binaries need it.
pub async fn open_store(config: &CompassConfig) -> Result<PgResumeStore, CompassError> {
    let pool = create_pool(&config.database).await?;
    Ok(PgResumeStore::new(
        pool,
        &config.store,
        config.embedding.dimensions as usize,
    ))
}

/// Load the configured encoder and check it agrees with the embedding column.
pub fn load_encoder(config: &CompassConfig) -> Result<Arc<dyn Encoder>, CompassError> {
    let encoder: Arc<dyn Encoder> = Arc::from(create_encoder(&config.embedding)?);
    let expected = config.embedding.dimensions as usize;
    if encoder.dimensions() != expected {
        return Err(CompassError::Other(format!(
            "encoder {} produces {} dimensions, embedding column is vector({})",
            encoder.model_name(),
            encoder.dimensions(),
            expected
        )));
    }
    Ok(encoder)
}
