//! Inventory reservation domain.
//!
//! This crate contains the business rules of the stock ledger and the
//! reservation lifecycle, implemented purely as deterministic logic (no IO,
//! no storage). Storage backends in `stockroom-infra` either run these
//! transitions directly (in-memory) or express the same rules as conditional
//! SQL (Postgres).

pub mod low_stock;
pub mod movement;
pub mod reservation;
pub mod stock;

pub use low_stock::LowStockItem;
pub use movement::{Movement, MovementType, NewMovement, ReferenceType};
pub use reservation::{ReserveStock, Reservation, ReservationStatus};
pub use stock::{StockKey, StockRecord, StockUpdate};
