//! Infrastructure layer: storage backends, configuration, background workers.

pub mod config;
pub mod db;
pub mod error;
pub mod inventory_store;
pub mod workers;

pub use config::{ConfigError, InventoryConfig};
pub use error::InventoryError;
pub use inventory_store::{
    ExpirationQuery, InMemoryInventoryStore, InventoryStore, LowStockReport, MovementRecorder,
    PostgresInventoryStore, ReservationManager, StockLedger,
};
pub use workers::{ExpirationSweeper, SweepReport, SweeperConfig, SweeperHandle};
