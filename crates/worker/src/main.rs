//! Expiration sweeper process.
//!
//! Connects to Postgres, makes sure the schema exists and releases expired
//! reservations on a fixed interval until interrupted.

use std::sync::Arc;

use anyhow::Context;

use stockroom_infra::db::{connect, ensure_schema};
use stockroom_infra::{ExpirationSweeper, InventoryConfig, PostgresInventoryStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockroom_observability::init();

    let config = InventoryConfig::from_env().context("invalid inventory configuration")?;
    let pool = connect(&config).await.context("failed to connect to postgres")?;
    ensure_schema(&pool).await.context("failed to apply inventory schema")?;

    let store = Arc::new(PostgresInventoryStore::new(pool));
    let handle = ExpirationSweeper::new(store, config.sweeper())
        .context("invalid sweeper configuration")?
        .spawn();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown requested");

    handle.shutdown().await;
    Ok(())
}
