//! Postgres-backed inventory store.
//!
//! ## Concurrency
//!
//! - `reserve_stock` debits availability with a single conditional
//!   `UPDATE ... WHERE available_quantity >= $n`. Two concurrent reservations
//!   for the last units serialize on the stock row lock and the loser matches
//!   zero rows, so overselling is impossible without any read-then-write.
//! - Release/confirm lock the reservation row with `SELECT ... FOR UPDATE`
//!   before looking at its status. A second caller blocks, then sees the
//!   terminal status and gets `AlreadyProcessed`.
//! - Batch order operations lock every reservation of the order in
//!   `(product_id, variant_id, id)` order, so stock rows are always taken in
//!   the same order and two overlapping batches cannot deadlock each other.
//!
//! The schema (see `migrations/0001_inventory.sql`) carries CHECK constraints
//! for the stock invariants as a second line; a violation surfaces as
//! `TransactionFailure` with SQLSTATE `23514`.
//!
//! Timestamps are truncated to microseconds before they are written so values
//! returned by a write compare equal to the same row read back later.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, PgPool, Row};
use tracing::{Span, debug, instrument};
use uuid::Uuid;

use stockroom_core::{MovementId, OrderId, ProductId, ReservationId, StorefrontId, VariantId};
use stockroom_inventory::{
    LowStockItem, Movement, MovementType, NewMovement, ReferenceType, ReserveStock, Reservation,
    ReservationStatus, StockKey, StockRecord, StockUpdate,
};

use super::r#trait::{ExpirationQuery, LowStockReport, MovementRecorder, ReservationManager, StockLedger};
use super::settlement::Settlement;
use crate::error::{InventoryError, is_check_violation, map_sqlx_error};

macro_rules! stock_columns {
    () => {
        "product_id, variant_id, storefront_id, product_name, variant_name, \
         quantity, reserved_quantity, available_quantity, low_stock_threshold, updated_at"
    };
}

macro_rules! reservation_columns {
    () => {
        "id, order_id, product_id, variant_id, quantity, status, expires_at, created_at, updated_at"
    };
}

macro_rules! movement_columns {
    () => {
        "id, product_id, variant_id, movement_type, quantity, reference_type, reference_id, \
         notes, metadata, created_at"
    };
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn variant_uuid(key: &StockKey) -> Option<Uuid> {
    key.variant_id.map(|v| *v.as_uuid())
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Postgres inventory store.
///
/// Every mutating operation runs in one transaction; nothing is committed
/// unless the reservation row, the stock counters and the movement entries
/// were all written.
#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: Arc<PgPool>,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self, key), fields(key = %key), err)]
    pub async fn load_stock(&self, key: &StockKey) -> Result<StockRecord, InventoryError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("get_stock", e))?;
        let found = fetch_stock(&mut *conn, key).await?;
        Ok(found.unwrap_or_else(|| StockRecord::empty(*key, now())))
    }

    #[instrument(
        skip(self, update),
        fields(key = %update.key, quantity = update.quantity),
        err
    )]
    pub async fn upsert_stock(&self, update: StockUpdate) -> Result<StockRecord, InventoryError> {
        update
            .validate()
            .map_err(|e| InventoryError::from_domain("update_stock", e))?;

        let row = sqlx::query(concat!(
            r#"
            INSERT INTO inventory_stock (
                product_id, variant_id, storefront_id, product_name, variant_name,
                quantity, reserved_quantity, available_quantity, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 0, $6, $7)
            ON CONFLICT ON CONSTRAINT inventory_stock_key DO UPDATE SET
                quantity = EXCLUDED.quantity,
                available_quantity = EXCLUDED.quantity - inventory_stock.reserved_quantity,
                storefront_id = COALESCE(EXCLUDED.storefront_id, inventory_stock.storefront_id),
                product_name = COALESCE(EXCLUDED.product_name, inventory_stock.product_name),
                variant_name = COALESCE(EXCLUDED.variant_name, inventory_stock.variant_name),
                updated_at = EXCLUDED.updated_at
            RETURNING "#,
            stock_columns!()
        ))
        .bind(update.key.product_id.as_uuid())
        .bind(variant_uuid(&update.key))
        .bind(update.storefront_id.map(|s| *s.as_uuid()))
        .bind(&update.product_name)
        .bind(&update.variant_name)
        .bind(update.quantity)
        .bind(now())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| {
            if is_check_violation(&e) {
                InventoryError::Validation(format!(
                    "quantity {} is below reserved quantity for {}",
                    update.quantity, update.key
                ))
            } else {
                map_sqlx_error("update_stock", e)
            }
        })?;

        Ok(StockRow::from_row(&row)
            .map_err(|e| map_sqlx_error("update_stock", e))?
            .into())
    }

    #[instrument(skip(self, key), fields(key = %key), err)]
    pub async fn upsert_low_stock_threshold(
        &self,
        key: &StockKey,
        threshold: i64,
    ) -> Result<StockRecord, InventoryError> {
        if threshold < 0 {
            return Err(InventoryError::Validation(
                "low stock threshold cannot be negative".into(),
            ));
        }

        let row = sqlx::query(concat!(
            r#"
            INSERT INTO inventory_stock (product_id, variant_id, low_stock_threshold, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT ON CONSTRAINT inventory_stock_key DO UPDATE SET
                low_stock_threshold = EXCLUDED.low_stock_threshold,
                updated_at = EXCLUDED.updated_at
            RETURNING "#,
            stock_columns!()
        ))
        .bind(key.product_id.as_uuid())
        .bind(variant_uuid(key))
        .bind(threshold)
        .bind(now())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_low_stock_threshold", e))?;

        Ok(StockRow::from_row(&row)
            .map_err(|e| map_sqlx_error("set_low_stock_threshold", e))?
            .into())
    }

    #[instrument(
        skip(self, entry),
        fields(key = %entry.key, movement_type = %entry.movement_type),
        err
    )]
    pub async fn append_movement(&self, entry: NewMovement) -> Result<Movement, InventoryError> {
        let movement = Movement::record(MovementId::new(), entry, now())
            .map_err(|e| InventoryError::from_domain("record_movement", e))?;
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("record_movement", e))?;
        insert_movement(&mut *conn, "record_movement", &movement).await?;
        Ok(movement)
    }

    #[instrument(skip(self, key), fields(key = %key), err)]
    pub async fn load_movements(
        &self,
        key: &StockKey,
        limit: usize,
    ) -> Result<Vec<Movement>, InventoryError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            movement_columns!(),
            r#"
            FROM inventory_movements
            WHERE product_id = $1 AND variant_id IS NOT DISTINCT FROM $2
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#
        ))
        .bind(key.product_id.as_uuid())
        .bind(variant_uuid(key))
        .bind(limit_param(limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_movements", e))?;

        rows.iter()
            .map(|row| {
                MovementRow::from_row(row)
                    .map_err(|e| map_sqlx_error("list_movements", e))?
                    .into_domain("list_movements")
            })
            .collect()
    }

    #[instrument(
        skip(self, cmd),
        fields(
            order_id = %cmd.order_id,
            key = %cmd.key,
            quantity = cmd.quantity,
            reservation_id = tracing::field::Empty
        ),
        err
    )]
    pub async fn reserve(&self, mut cmd: ReserveStock) -> Result<Reservation, InventoryError> {
        const OP: &str = "reserve_stock";
        cmd.validate().map_err(|e| InventoryError::from_domain(OP, e))?;
        cmd.expires_at = cmd.expires_at.trunc_subsecs(6);
        let now = now();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let debited = sqlx::query(
            r#"
            UPDATE inventory_stock
            SET reserved_quantity = reserved_quantity + $3,
                available_quantity = available_quantity - $3,
                updated_at = $4
            WHERE product_id = $1
              AND variant_id IS NOT DISTINCT FROM $2
              AND available_quantity >= $3
            "#,
        )
        .bind(cmd.key.product_id.as_uuid())
        .bind(variant_uuid(&cmd.key))
        .bind(cmd.quantity)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?
        .rows_affected();

        if debited == 0 {
            // Informational only; the decision was made by the UPDATE above.
            let available = fetch_stock(&mut *tx, &cmd.key)
                .await?
                .map(|s| s.available_quantity)
                .unwrap_or(0);
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(InventoryError::InsufficientStock {
                key: cmd.key,
                requested: cmd.quantity,
                available,
            });
        }

        let reservation = Reservation::open(ReservationId::new(), &cmd, now)
            .map_err(|e| InventoryError::from_domain(OP, e))?;
        insert_reservation(&mut *tx, &reservation).await?;

        let movement = Movement::record(
            MovementId::new(),
            NewMovement::for_reservation(&reservation),
            now,
        )
        .map_err(|e| InventoryError::from_domain(OP, e))?;
        insert_movement(&mut *tx, OP, &movement).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Span::current().record("reservation_id", tracing::field::display(reservation.id));
        Ok(reservation)
    }

    #[instrument(skip(self), err)]
    async fn settle(
        &self,
        id: ReservationId,
        settlement: Settlement,
    ) -> Result<Reservation, InventoryError> {
        let op = settlement.operation();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(concat!(
            "SELECT ",
            reservation_columns!(),
            " FROM inventory_reservations WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        let Some(row) = row else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(InventoryError::reservation_not_found(id));
        };
        let reservation = ReservationRow::from_row(&row)
            .map_err(|e| map_sqlx_error(op, e))?
            .into_domain(op)?;

        let settled = match settle_locked(&mut *tx, &reservation, settlement, now()).await {
            Ok(settled) => settled,
            Err(err) => {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(err);
            }
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        debug!(status = %settled.status, "reservation settled");
        Ok(settled)
    }

    #[instrument(skip(self), fields(settled = tracing::field::Empty), err)]
    async fn settle_order(
        &self,
        order_id: OrderId,
        settlement: Settlement,
    ) -> Result<Vec<Reservation>, InventoryError> {
        let op = settlement.batch_operation();
        let now = now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let rows = sqlx::query(concat!(
            "SELECT ",
            reservation_columns!(),
            r#"
            FROM inventory_reservations
            WHERE order_id = $1 AND status = 'reserved'
            ORDER BY product_id, variant_id NULLS FIRST, id
            FOR UPDATE
            "#
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        let mut settled = Vec::with_capacity(rows.len());
        for row in &rows {
            let reservation = ReservationRow::from_row(row)
                .map_err(|e| map_sqlx_error(op, e))?
                .into_domain(op)?;
            // Any failure drops `tx`, rolling back every reservation of the batch.
            settled.push(settle_locked(&mut *tx, &reservation, settlement, now).await?);
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Span::current().record("settled", settled.len());
        Ok(settled)
    }

    #[instrument(skip(self), err)]
    pub async fn load_reservation(&self, id: ReservationId) -> Result<Reservation, InventoryError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            reservation_columns!(),
            " FROM inventory_reservations WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_reservation", e))?
        .ok_or_else(|| InventoryError::reservation_not_found(id))?;

        ReservationRow::from_row(&row)
            .map_err(|e| map_sqlx_error("get_reservation", e))?
            .into_domain("get_reservation")
    }

    #[instrument(skip(self), err)]
    pub async fn load_order_reservations(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Reservation>, InventoryError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            reservation_columns!(),
            r#"
            FROM inventory_reservations
            WHERE order_id = $1
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_reservations_by_order", e))?;

        reservations_from_rows(&rows, "get_reservations_by_order")
    }

    #[instrument(skip(self, as_of), fields(as_of = %as_of), err)]
    pub async fn load_expired(
        &self,
        as_of: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reservation>, InventoryError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            reservation_columns!(),
            r#"
            FROM inventory_reservations
            WHERE status = 'reserved' AND expires_at < $1
            ORDER BY expires_at ASC, id ASC
            LIMIT $2
            "#
        ))
        .bind(as_of)
        .bind(limit_param(limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_expired_reservations", e))?;

        reservations_from_rows(&rows, "get_expired_reservations")
    }

    #[instrument(skip(self), err)]
    pub async fn load_low_stock(
        &self,
        storefront_id: StorefrontId,
    ) -> Result<Vec<LowStockItem>, InventoryError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            stock_columns!(),
            r#"
            FROM inventory_stock
            WHERE storefront_id = $1
              AND low_stock_threshold > 0
              AND available_quantity <= low_stock_threshold
            ORDER BY available_quantity ASC, product_name ASC
            "#
        ))
        .bind(storefront_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_low_stock_items", e))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let record: StockRecord = StockRow::from_row(row)
                .map_err(|e| map_sqlx_error("get_low_stock_items", e))?
                .into();
            items.extend(LowStockItem::from_record(&record));
        }
        Ok(items)
    }
}

async fn fetch_stock(
    conn: &mut PgConnection,
    key: &StockKey,
) -> Result<Option<StockRecord>, InventoryError> {
    let row = sqlx::query(concat!(
        "SELECT ",
        stock_columns!(),
        " FROM inventory_stock WHERE product_id = $1 AND variant_id IS NOT DISTINCT FROM $2"
    ))
    .bind(key.product_id.as_uuid())
    .bind(variant_uuid(key))
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("get_stock", e))?;

    row.map(|r| StockRow::from_row(&r).map(StockRecord::from))
        .transpose()
        .map_err(|e| map_sqlx_error("get_stock", e))
}

async fn insert_reservation(
    conn: &mut PgConnection,
    reservation: &Reservation,
) -> Result<(), InventoryError> {
    sqlx::query(
        r#"
        INSERT INTO inventory_reservations (
            id, order_id, product_id, variant_id, quantity, status,
            expires_at, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(reservation.id.as_uuid())
    .bind(reservation.order_id.as_uuid())
    .bind(reservation.key.product_id.as_uuid())
    .bind(variant_uuid(&reservation.key))
    .bind(reservation.quantity)
    .bind(reservation.status.as_str())
    .bind(reservation.expires_at)
    .bind(reservation.created_at)
    .bind(reservation.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("insert_reservation", e))?;
    Ok(())
}

async fn insert_movement(
    conn: &mut PgConnection,
    operation: &'static str,
    movement: &Movement,
) -> Result<(), InventoryError> {
    sqlx::query(
        r#"
        INSERT INTO inventory_movements (
            id, product_id, variant_id, movement_type, quantity,
            reference_type, reference_id, notes, metadata, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(movement.id.as_uuid())
    .bind(movement.key.product_id.as_uuid())
    .bind(variant_uuid(&movement.key))
    .bind(movement.movement_type.as_str())
    .bind(movement.quantity)
    .bind(movement.reference_type.map(|r| r.as_str()))
    .bind(movement.reference_id)
    .bind(&movement.notes)
    .bind(&movement.metadata)
    .bind(movement.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(operation, e))?;
    Ok(())
}

/// Transition a reservation whose row is already locked by `conn`'s
/// transaction, adjust its stock row and journal the movement.
async fn settle_locked(
    conn: &mut PgConnection,
    reservation: &Reservation,
    settlement: Settlement,
    now: DateTime<Utc>,
) -> Result<Reservation, InventoryError> {
    let op = settlement.operation();
    let settled = settlement.settle(reservation, now)?;

    let stock_sql = match settlement {
        Settlement::Release => {
            r#"
            UPDATE inventory_stock
            SET reserved_quantity = reserved_quantity - $3,
                available_quantity = available_quantity + $3,
                updated_at = $4
            WHERE product_id = $1
              AND variant_id IS NOT DISTINCT FROM $2
              AND reserved_quantity >= $3
            "#
        }
        Settlement::Confirm => {
            r#"
            UPDATE inventory_stock
            SET quantity = quantity - $3,
                reserved_quantity = reserved_quantity - $3,
                updated_at = $4
            WHERE product_id = $1
              AND variant_id IS NOT DISTINCT FROM $2
              AND reserved_quantity >= $3
            "#
        }
    };

    let touched = sqlx::query(stock_sql)
        .bind(reservation.key.product_id.as_uuid())
        .bind(variant_uuid(&reservation.key))
        .bind(reservation.quantity)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(op, e))?
        .rows_affected();
    if touched == 0 {
        return Err(InventoryError::transaction(
            op,
            format!("stock row missing or reserved below held for {}", reservation.key),
        ));
    }

    sqlx::query(
        r#"
        UPDATE inventory_reservations
        SET status = $2, updated_at = $3
        WHERE id = $1 AND status = 'reserved'
        "#,
    )
    .bind(settled.id.as_uuid())
    .bind(settled.status.as_str())
    .bind(settled.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(op, e))?;

    let movement = Movement::record(MovementId::new(), settlement.movement(&settled), now)
        .map_err(|e| InventoryError::from_domain(op, e))?;
    insert_movement(conn, op, &movement).await?;

    Ok(settled)
}

fn reservations_from_rows(
    rows: &[PgRow],
    operation: &'static str,
) -> Result<Vec<Reservation>, InventoryError> {
    rows.iter()
        .map(|row| {
            ReservationRow::from_row(row)
                .map_err(|e| map_sqlx_error(operation, e))?
                .into_domain(operation)
        })
        .collect()
}

/// Stored value that no longer parses into a domain enum.
fn corrupt(operation: &'static str, what: &str, value: &str) -> InventoryError {
    InventoryError::transaction(operation, format!("unrecognized {what} '{value}' in storage"))
}

// Row mapping

struct StockRow {
    product_id: Uuid,
    variant_id: Option<Uuid>,
    storefront_id: Option<Uuid>,
    product_name: Option<String>,
    variant_name: Option<String>,
    quantity: i64,
    reserved_quantity: i64,
    available_quantity: i64,
    low_stock_threshold: i64,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for StockRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StockRow {
            product_id: row.try_get("product_id")?,
            variant_id: row.try_get("variant_id")?,
            storefront_id: row.try_get("storefront_id")?,
            product_name: row.try_get("product_name")?,
            variant_name: row.try_get("variant_name")?,
            quantity: row.try_get("quantity")?,
            reserved_quantity: row.try_get("reserved_quantity")?,
            available_quantity: row.try_get("available_quantity")?,
            low_stock_threshold: row.try_get("low_stock_threshold")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<StockRow> for StockRecord {
    fn from(row: StockRow) -> Self {
        StockRecord {
            key: StockKey::new(
                ProductId::from_uuid(row.product_id),
                row.variant_id.map(VariantId::from_uuid),
            ),
            storefront_id: row.storefront_id.map(StorefrontId::from_uuid),
            product_name: row.product_name,
            variant_name: row.variant_name,
            quantity: row.quantity,
            reserved_quantity: row.reserved_quantity,
            available_quantity: row.available_quantity,
            low_stock_threshold: row.low_stock_threshold,
            updated_at: row.updated_at,
        }
    }
}

struct ReservationRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i64,
    status: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ReservationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ReservationRow {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            product_id: row.try_get("product_id")?,
            variant_id: row.try_get("variant_id")?,
            quantity: row.try_get("quantity")?,
            status: row.try_get("status")?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl ReservationRow {
    fn into_domain(self, operation: &'static str) -> Result<Reservation, InventoryError> {
        let status: ReservationStatus = self
            .status
            .parse()
            .map_err(|_| corrupt(operation, "reservation status", &self.status))?;
        Ok(Reservation {
            id: ReservationId::from_uuid(self.id),
            order_id: OrderId::from_uuid(self.order_id),
            key: StockKey::new(
                ProductId::from_uuid(self.product_id),
                self.variant_id.map(VariantId::from_uuid),
            ),
            quantity: self.quantity,
            status,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct MovementRow {
    id: Uuid,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    movement_type: String,
    quantity: i64,
    reference_type: Option<String>,
    reference_id: Option<Uuid>,
    notes: Option<String>,
    metadata: JsonValue,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for MovementRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovementRow {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            variant_id: row.try_get("variant_id")?,
            movement_type: row.try_get("movement_type")?,
            quantity: row.try_get("quantity")?,
            reference_type: row.try_get("reference_type")?,
            reference_id: row.try_get("reference_id")?,
            notes: row.try_get("notes")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl MovementRow {
    fn into_domain(self, operation: &'static str) -> Result<Movement, InventoryError> {
        let movement_type: MovementType = self
            .movement_type
            .parse()
            .map_err(|_| corrupt(operation, "movement type", &self.movement_type))?;
        let reference_type = match self.reference_type.as_deref() {
            None => None,
            Some(raw) => Some(
                raw.parse::<ReferenceType>()
                    .map_err(|_| corrupt(operation, "reference type", raw))?,
            ),
        };
        Ok(Movement {
            id: MovementId::from_uuid(self.id),
            key: StockKey::new(
                ProductId::from_uuid(self.product_id),
                self.variant_id.map(VariantId::from_uuid),
            ),
            movement_type,
            quantity: self.quantity,
            reference_type,
            reference_id: self.reference_id,
            notes: self.notes,
            metadata: self.metadata,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl StockLedger for PostgresInventoryStore {
    async fn get_stock(&self, key: &StockKey) -> Result<StockRecord, InventoryError> {
        self.load_stock(key).await
    }

    async fn update_stock(&self, update: StockUpdate) -> Result<StockRecord, InventoryError> {
        self.upsert_stock(update).await
    }

    async fn set_low_stock_threshold(
        &self,
        key: &StockKey,
        threshold: i64,
    ) -> Result<StockRecord, InventoryError> {
        self.upsert_low_stock_threshold(key, threshold).await
    }
}

#[async_trait]
impl MovementRecorder for PostgresInventoryStore {
    async fn record_movement(&self, entry: NewMovement) -> Result<Movement, InventoryError> {
        self.append_movement(entry).await
    }

    async fn list_movements(
        &self,
        key: &StockKey,
        limit: usize,
    ) -> Result<Vec<Movement>, InventoryError> {
        self.load_movements(key, limit).await
    }
}

#[async_trait]
impl ReservationManager for PostgresInventoryStore {
    async fn reserve_stock(&self, cmd: ReserveStock) -> Result<Reservation, InventoryError> {
        self.reserve(cmd).await
    }

    async fn release_reservation(&self, id: ReservationId) -> Result<Reservation, InventoryError> {
        self.settle(id, Settlement::Release).await
    }

    async fn confirm_reservation(&self, id: ReservationId) -> Result<Reservation, InventoryError> {
        self.settle(id, Settlement::Confirm).await
    }

    async fn release_order_reservations(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Reservation>, InventoryError> {
        self.settle_order(order_id, Settlement::Release).await
    }

    async fn confirm_order_reservations(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Reservation>, InventoryError> {
        self.settle_order(order_id, Settlement::Confirm).await
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Reservation, InventoryError> {
        self.load_reservation(id).await
    }

    async fn get_reservations_by_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Reservation>, InventoryError> {
        self.load_order_reservations(order_id).await
    }
}

#[async_trait]
impl ExpirationQuery for PostgresInventoryStore {
    async fn get_expired_reservations(
        &self,
        as_of: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reservation>, InventoryError> {
        self.load_expired(as_of, limit).await
    }
}

#[async_trait]
impl LowStockReport for PostgresInventoryStore {
    async fn get_low_stock_items(
        &self,
        storefront_id: StorefrontId,
    ) -> Result<Vec<LowStockItem>, InventoryError> {
        self.load_low_stock(storefront_id).await
    }
}
