use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use stockroom_core::{MovementId, OrderId, ReservationId, StorefrontId};
use stockroom_inventory::{
    LowStockItem, Movement, NewMovement, ReserveStock, Reservation, StockKey, StockRecord,
    StockUpdate,
};

use super::r#trait::{ExpirationQuery, LowStockReport, MovementRecorder, ReservationManager, StockLedger};
use super::settlement::Settlement;
use crate::error::InventoryError;

#[derive(Debug, Default)]
struct State {
    stock: HashMap<StockKey, StockRecord>,
    reservations: HashMap<ReservationId, Reservation>,
    movements: Vec<Movement>,
}

impl State {
    fn stock_or_empty(&self, key: &StockKey, now: DateTime<Utc>) -> StockRecord {
        self.stock
            .get(key)
            .cloned()
            .unwrap_or_else(|| StockRecord::empty(*key, now))
    }
}

/// Writes staged by one operation; applied to `State` only once every step
/// has succeeded.
#[derive(Debug, Default)]
struct Changes {
    stock: HashMap<StockKey, StockRecord>,
    reservations: Vec<Reservation>,
    movements: Vec<Movement>,
}

impl Changes {
    fn settle(
        &mut self,
        state: &State,
        reservation: &Reservation,
        settlement: Settlement,
        now: DateTime<Utc>,
    ) -> Result<Reservation, InventoryError> {
        let settled = settlement.settle(reservation, now)?;

        let stock = self
            .stock
            .get(&reservation.key)
            .or_else(|| state.stock.get(&reservation.key))
            .ok_or_else(|| {
                InventoryError::transaction(
                    settlement.operation(),
                    format!("no stock row for {}", reservation.key),
                )
            })?;
        let next_stock = settlement.apply_to_stock(stock, reservation.quantity, now)?;

        let movement = Movement::record(MovementId::new(), settlement.movement(&settled), now)
            .map_err(|e| InventoryError::from_domain(settlement.operation(), e))?;

        self.stock.insert(reservation.key, next_stock);
        self.reservations.push(settled.clone());
        self.movements.push(movement);
        Ok(settled)
    }

    fn commit(self, state: &mut State) {
        state.stock.extend(self.stock);
        for r in self.reservations {
            state.reservations.insert(r.id, r);
        }
        state.movements.extend(self.movements);
    }
}

/// In-memory inventory store.
///
/// Intended for tests/dev. One `RwLock` around the whole state plays the role
/// of the database transaction: each operation takes the write lock once,
/// stages its changes and applies them only if every step succeeded.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    state: RwLock<State>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self, operation: &'static str) -> Result<RwLockReadGuard<'_, State>, InventoryError> {
        self.state
            .read()
            .map_err(|_| InventoryError::transaction(operation, "lock poisoned"))
    }

    fn write(&self, operation: &'static str) -> Result<RwLockWriteGuard<'_, State>, InventoryError> {
        self.state
            .write()
            .map_err(|_| InventoryError::transaction(operation, "lock poisoned"))
    }

    fn settle_one(
        &self,
        id: ReservationId,
        settlement: Settlement,
    ) -> Result<Reservation, InventoryError> {
        let now = Utc::now();
        let mut state = self.write(settlement.operation())?;
        let reservation = state
            .reservations
            .get(&id)
            .cloned()
            .ok_or_else(|| InventoryError::reservation_not_found(id))?;

        let mut changes = Changes::default();
        let settled = changes.settle(&state, &reservation, settlement, now)?;
        changes.commit(&mut state);

        debug!(reservation_id = %id, status = %settled.status, "reservation settled");
        Ok(settled)
    }

    fn settle_order(
        &self,
        order_id: OrderId,
        settlement: Settlement,
    ) -> Result<Vec<Reservation>, InventoryError> {
        let now = Utc::now();
        let mut state = self.write(settlement.batch_operation())?;

        let mut active: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| r.order_id == order_id && r.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|r| (r.key, r.id));

        let mut changes = Changes::default();
        let mut settled = Vec::with_capacity(active.len());
        for reservation in &active {
            settled.push(changes.settle(&state, reservation, settlement, now)?);
        }
        changes.commit(&mut state);

        debug!(order_id = %order_id, count = settled.len(), "order reservations settled");
        Ok(settled)
    }
}

#[async_trait]
impl StockLedger for InMemoryInventoryStore {
    async fn get_stock(&self, key: &StockKey) -> Result<StockRecord, InventoryError> {
        let state = self.read("get_stock")?;
        Ok(state.stock_or_empty(key, Utc::now()))
    }

    async fn update_stock(&self, update: StockUpdate) -> Result<StockRecord, InventoryError> {
        let now = Utc::now();
        let mut state = self.write("update_stock")?;
        let next = state
            .stock_or_empty(&update.key, now)
            .apply_update(&update, now)
            .map_err(|e| InventoryError::from_domain("update_stock", e))?;
        state.stock.insert(update.key, next.clone());
        Ok(next)
    }

    async fn set_low_stock_threshold(
        &self,
        key: &StockKey,
        threshold: i64,
    ) -> Result<StockRecord, InventoryError> {
        let now = Utc::now();
        let mut state = self.write("set_low_stock_threshold")?;
        let next = state
            .stock_or_empty(key, now)
            .with_low_stock_threshold(threshold, now)
            .map_err(|e| InventoryError::from_domain("set_low_stock_threshold", e))?;
        state.stock.insert(*key, next.clone());
        Ok(next)
    }
}

#[async_trait]
impl MovementRecorder for InMemoryInventoryStore {
    async fn record_movement(&self, entry: NewMovement) -> Result<Movement, InventoryError> {
        let movement = Movement::record(MovementId::new(), entry, Utc::now())
            .map_err(|e| InventoryError::from_domain("record_movement", e))?;
        let mut state = self.write("record_movement")?;
        state.movements.push(movement.clone());
        Ok(movement)
    }

    async fn list_movements(
        &self,
        key: &StockKey,
        limit: usize,
    ) -> Result<Vec<Movement>, InventoryError> {
        let state = self.read("list_movements")?;
        Ok(state
            .movements
            .iter()
            .rev()
            .filter(|m| &m.key == key)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReservationManager for InMemoryInventoryStore {
    async fn reserve_stock(&self, cmd: ReserveStock) -> Result<Reservation, InventoryError> {
        cmd.validate()
            .map_err(|e| InventoryError::from_domain("reserve_stock", e))?;

        let now = Utc::now();
        let mut state = self.write("reserve_stock")?;
        let current = state.stock_or_empty(&cmd.key, now);

        let Some(held) = current.try_reserve(cmd.quantity, now) else {
            return Err(InventoryError::InsufficientStock {
                key: cmd.key,
                requested: cmd.quantity,
                available: current.available_quantity,
            });
        };

        let reservation = Reservation::open(ReservationId::new(), &cmd, now)
            .map_err(|e| InventoryError::from_domain("reserve_stock", e))?;
        let movement = Movement::record(
            MovementId::new(),
            NewMovement::for_reservation(&reservation),
            now,
        )
        .map_err(|e| InventoryError::from_domain("reserve_stock", e))?;

        state.stock.insert(cmd.key, held);
        state.reservations.insert(reservation.id, reservation.clone());
        state.movements.push(movement);

        debug!(reservation_id = %reservation.id, order_id = %cmd.order_id, "stock reserved");
        Ok(reservation)
    }

    async fn release_reservation(&self, id: ReservationId) -> Result<Reservation, InventoryError> {
        self.settle_one(id, Settlement::Release)
    }

    async fn confirm_reservation(&self, id: ReservationId) -> Result<Reservation, InventoryError> {
        self.settle_one(id, Settlement::Confirm)
    }

    async fn release_order_reservations(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Reservation>, InventoryError> {
        self.settle_order(order_id, Settlement::Release)
    }

    async fn confirm_order_reservations(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Reservation>, InventoryError> {
        self.settle_order(order_id, Settlement::Confirm)
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Reservation, InventoryError> {
        let state = self.read("get_reservation")?;
        state
            .reservations
            .get(&id)
            .cloned()
            .ok_or_else(|| InventoryError::reservation_not_found(id))
    }

    async fn get_reservations_by_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Reservation>, InventoryError> {
        let state = self.read("get_reservations_by_order")?;
        let mut found: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| (r.created_at, r.id));
        Ok(found)
    }
}

#[async_trait]
impl ExpirationQuery for InMemoryInventoryStore {
    async fn get_expired_reservations(
        &self,
        as_of: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reservation>, InventoryError> {
        let state = self.read("get_expired_reservations")?;
        let mut expired: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| r.is_expired(as_of))
            .cloned()
            .collect();
        expired.sort_by_key(|r| (r.expires_at, r.id));
        expired.truncate(limit);
        Ok(expired)
    }
}

#[async_trait]
impl LowStockReport for InMemoryInventoryStore {
    async fn get_low_stock_items(
        &self,
        storefront_id: StorefrontId,
    ) -> Result<Vec<LowStockItem>, InventoryError> {
        let state = self.read("get_low_stock_items")?;
        let mut items: Vec<LowStockItem> = state
            .stock
            .values()
            .filter(|s| s.storefront_id == Some(storefront_id))
            .filter_map(LowStockItem::from_record)
            .collect();
        items.sort_by(|a, b| {
            a.available_quantity
                .cmp(&b.available_quantity)
                .then_with(|| a.product_name.cmp(&b.product_name))
        });
        Ok(items)
    }
}
