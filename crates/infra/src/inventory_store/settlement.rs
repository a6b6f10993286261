//! The two ways a reservation leaves `reserved`, shared by both backends.

use chrono::{DateTime, Utc};

use stockroom_inventory::{NewMovement, Reservation, StockRecord};

use crate::error::InventoryError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Settlement {
    Release,
    Confirm,
}

impl Settlement {
    pub(crate) fn operation(self) -> &'static str {
        match self {
            Settlement::Release => "release_reservation",
            Settlement::Confirm => "confirm_reservation",
        }
    }

    pub(crate) fn batch_operation(self) -> &'static str {
        match self {
            Settlement::Release => "release_order_reservations",
            Settlement::Confirm => "confirm_order_reservations",
        }
    }

    /// Terminal state for a reservation that must still be `reserved`.
    pub(crate) fn settle(
        self,
        reservation: &Reservation,
        now: DateTime<Utc>,
    ) -> Result<Reservation, InventoryError> {
        if reservation.status.is_terminal() {
            return Err(InventoryError::AlreadyProcessed {
                reservation_id: reservation.id,
                status: reservation.status,
            });
        }
        let settled = match self {
            Settlement::Release => reservation.release(now),
            Settlement::Confirm => reservation.confirm(now),
        };
        settled.map_err(|e| InventoryError::from_domain(self.operation(), e))
    }

    pub(crate) fn apply_to_stock(
        self,
        stock: &StockRecord,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<StockRecord, InventoryError> {
        let next = match self {
            Settlement::Release => stock.release(quantity, now),
            Settlement::Confirm => stock.consume(quantity, now),
        };
        next.map_err(|e| InventoryError::from_domain(self.operation(), e))
    }

    pub(crate) fn movement(self, settled: &Reservation) -> NewMovement {
        match self {
            Settlement::Release => NewMovement::for_release(settled),
            Settlement::Confirm => NewMovement::for_sale(settled),
        }
    }
}
