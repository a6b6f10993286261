//! Inventory storage boundary.
//!
//! The engine's components are expressed as traits (`StockLedger`,
//! `MovementRecorder`, `ReservationManager`, `ExpirationQuery`,
//! `LowStockReport`). Two backends implement all of them:
//!
//! - [`InMemoryInventoryStore`] for tests and local development,
//! - [`PostgresInventoryStore`] for production.

pub mod in_memory;
pub mod postgres;
mod settlement;
pub mod r#trait;

pub use in_memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;
pub use r#trait::{
    ExpirationQuery, InventoryStore, LowStockReport, MovementRecorder, ReservationManager,
    StockLedger,
};
