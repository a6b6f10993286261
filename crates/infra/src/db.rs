//! Database adapters: connection pool and schema bootstrap.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, instrument};

use crate::config::InventoryConfig;
use crate::error::{InventoryError, map_sqlx_error};

/// Idempotent DDL for the three inventory relations.
pub const SCHEMA: &str = include_str!("../migrations/0001_inventory.sql");

/// Open a pool sized from configuration.
pub async fn connect(config: &InventoryConfig) -> Result<PgPool, InventoryError> {
    let url = config
        .database_url()
        .map_err(|e| InventoryError::Validation(e.to_string()))?;

    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))
}

/// Create tables, constraints and indexes when missing.
#[instrument(skip(pool), err)]
pub async fn ensure_schema(pool: &PgPool) -> Result<(), InventoryError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    info!("inventory schema ready");
    Ok(())
}
