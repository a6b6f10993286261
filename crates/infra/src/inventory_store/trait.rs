use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stockroom_core::{OrderId, ReservationId, StorefrontId};
use stockroom_inventory::{
    LowStockItem, Movement, NewMovement, ReserveStock, Reservation, StockKey, StockRecord,
    StockUpdate,
};

use crate::error::InventoryError;

/// Per-(product, variant) quantity counters.
///
/// Absence is not an error: a key without a row reads as a zero-valued record,
/// so "never stocked" and "explicitly zero" look the same to callers.
#[async_trait]
pub trait StockLedger: Send + Sync {
    async fn get_stock(&self, key: &StockKey) -> Result<StockRecord, InventoryError>;

    /// Upsert the absolute on-hand quantity.
    ///
    /// `available_quantity` is recomputed in the same statement and
    /// `reserved_quantity` is left alone. A quantity below what is currently
    /// reserved is rejected with `Validation`. No movement is recorded; callers
    /// that want an audit entry pair this with [`MovementRecorder::record_movement`].
    async fn update_stock(&self, update: StockUpdate) -> Result<StockRecord, InventoryError>;

    /// `0` turns low-stock reporting off for the row.
    async fn set_low_stock_threshold(
        &self,
        key: &StockKey,
        threshold: i64,
    ) -> Result<StockRecord, InventoryError>;
}

/// Append-only audit journal.
#[async_trait]
pub trait MovementRecorder: Send + Sync {
    /// Append one immutable entry. Never reads or mutates stock counters.
    async fn record_movement(&self, entry: NewMovement) -> Result<Movement, InventoryError>;

    /// Newest first.
    async fn list_movements(
        &self,
        key: &StockKey,
        limit: usize,
    ) -> Result<Vec<Movement>, InventoryError>;
}

/// Reservation state machine over the ledger.
///
/// Every mutating call is a single atomic unit: either the reservation row,
/// the stock counters and exactly one movement per transitioned reservation
/// are all written, or nothing is.
#[async_trait]
pub trait ReservationManager: Send + Sync {
    /// Hold stock for an order.
    ///
    /// The availability check and the debit are one conditional write; when it
    /// matches nothing the call fails with `InsufficientStock` and the ledger
    /// is unchanged.
    async fn reserve_stock(&self, cmd: ReserveStock) -> Result<Reservation, InventoryError>;

    /// `reserved -> released`: held units return to availability.
    async fn release_reservation(&self, id: ReservationId) -> Result<Reservation, InventoryError>;

    /// `reserved -> confirmed`: held units leave on-hand stock.
    async fn confirm_reservation(&self, id: ReservationId) -> Result<Reservation, InventoryError>;

    /// Release every still-active reservation of an order; terminal ones are skipped.
    async fn release_order_reservations(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Reservation>, InventoryError>;

    /// Confirm every still-active reservation of an order; terminal ones are skipped.
    async fn confirm_order_reservations(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Reservation>, InventoryError>;

    async fn get_reservation(&self, id: ReservationId) -> Result<Reservation, InventoryError>;

    async fn get_reservations_by_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Reservation>, InventoryError>;
}

/// Read-only scan used by the expiration sweeper.
#[async_trait]
pub trait ExpirationQuery: Send + Sync {
    /// Active reservations whose `expires_at` is before `as_of`, oldest
    /// expiry first, at most `limit` of them. Nothing is released here.
    async fn get_expired_reservations(
        &self,
        as_of: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reservation>, InventoryError>;
}

/// Read-only low-stock report.
#[async_trait]
pub trait LowStockReport: Send + Sync {
    /// Rows of the storefront with `available <= threshold` and `threshold > 0`.
    async fn get_low_stock_items(
        &self,
        storefront_id: StorefrontId,
    ) -> Result<Vec<LowStockItem>, InventoryError>;
}

/// Everything a complete backend provides.
pub trait InventoryStore:
    StockLedger + MovementRecorder + ReservationManager + ExpirationQuery + LowStockReport
{
}

impl<T> InventoryStore for T where
    T: StockLedger + MovementRecorder + ReservationManager + ExpirationQuery + LowStockReport
{
}
