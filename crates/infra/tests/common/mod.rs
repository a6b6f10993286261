//! Backend-agnostic behaviour checks, run against every `InventoryStore`.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};

use stockroom_core::{OrderId, ProductId, StorefrontId, VariantId};
use stockroom_infra::{InventoryError, InventoryStore};
use stockroom_inventory::{
    MovementType, NewMovement, ReserveStock, Reservation, ReservationStatus, StockKey, StockUpdate,
};

pub fn fresh_key() -> StockKey {
    StockKey::product(ProductId::new())
}

pub async fn stocked<S: InventoryStore + ?Sized>(store: &S, quantity: i64) -> StockKey {
    let key = fresh_key();
    store
        .update_stock(StockUpdate::new(key, quantity))
        .await
        .expect("seed stock");
    key
}

pub fn hold(order_id: OrderId, key: StockKey, quantity: i64) -> ReserveStock {
    ReserveStock::new(order_id, key, quantity, Utc::now() + Duration::minutes(15))
}

async fn counters<S: InventoryStore + ?Sized>(store: &S, key: &StockKey) -> (i64, i64, i64) {
    let s = store.get_stock(key).await.expect("get stock");
    assert_eq!(s.available_quantity, s.quantity - s.reserved_quantity);
    assert!(s.reserved_quantity >= 0 && s.reserved_quantity <= s.quantity);
    (s.quantity, s.reserved_quantity, s.available_quantity)
}

/// Reserve 4 of 10, then a 7-unit reserve fails and changes nothing.
/// Returns the successful reservation for the follow-up release.
pub async fn reserve_beyond_availability_changes_nothing<S: InventoryStore + ?Sized>(
    store: &S,
) -> (StockKey, Reservation) {
    let key = stocked(store, 10).await;

    let first = store.reserve_stock(hold(OrderId::new(), key, 4)).await.unwrap();
    assert_eq!(first.status, ReservationStatus::Reserved);
    assert_eq!(first.quantity, 4);
    assert_eq!(counters(store, &key).await, (10, 4, 6));

    let err = store
        .reserve_stock(hold(OrderId::new(), key, 7))
        .await
        .unwrap_err();
    match err {
        InventoryError::InsufficientStock { key: k, requested, available } => {
            assert_eq!(k, key);
            assert_eq!(requested, 7);
            assert_eq!(available, 6);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
    assert_eq!(counters(store, &key).await, (10, 4, 6));

    (key, first)
}

pub async fn release_restores_availability<S: InventoryStore + ?Sized>(store: &S) {
    let (key, reservation) = reserve_beyond_availability_changes_nothing(store).await;

    let released = store.release_reservation(reservation.id).await.unwrap();
    assert_eq!(released.status, ReservationStatus::Released);
    assert_eq!(counters(store, &key).await, (10, 0, 10));
}

pub async fn confirm_consumes_held_units<S: InventoryStore + ?Sized>(store: &S) {
    let key = stocked(store, 10).await;
    let reservation = store.reserve_stock(hold(OrderId::new(), key, 4)).await.unwrap();

    let confirmed = store.confirm_reservation(reservation.id).await.unwrap();
    assert_eq!(confirmed.status, ReservationStatus::Confirmed);
    assert_eq!(counters(store, &key).await, (6, 0, 6));
}

pub async fn expired_hold_is_listed_until_released<S: InventoryStore + ?Sized>(store: &S) {
    let key = stocked(store, 10).await;
    let expires_at = Utc::now() - Duration::minutes(1);
    let reservation = store
        .reserve_stock(ReserveStock::new(OrderId::new(), key, 3, expires_at))
        .await
        .unwrap();
    assert_eq!(counters(store, &key).await, (10, 3, 7));

    let as_of = Utc::now();
    let expired = store.get_expired_reservations(as_of, 10_000).await.unwrap();
    assert!(expired.iter().any(|r| r.id == reservation.id));
    assert!(expired.iter().all(|r| r.is_active() && r.expires_at < as_of));

    store.release_reservation(reservation.id).await.unwrap();

    let expired = store.get_expired_reservations(Utc::now(), 10_000).await.unwrap();
    assert!(!expired.iter().any(|r| r.id == reservation.id));
    assert_eq!(counters(store, &key).await, (10, 0, 10));
}

pub async fn unexpired_holds_are_not_reported<S: InventoryStore + ?Sized>(store: &S) {
    let key = stocked(store, 10).await;
    let live = store.reserve_stock(hold(OrderId::new(), key, 1)).await.unwrap();

    let expired = store.get_expired_reservations(Utc::now(), 10_000).await.unwrap();
    assert!(!expired.iter().any(|r| r.id == live.id));

    // Expiry alone never frees stock.
    assert_eq!(counters(store, &key).await, (10, 1, 9));
}

/// Concurrent reserves whose total exceeds stock: every failure asked for
/// more than what was left in the end, and nothing was oversold.
pub async fn no_oversell<S: InventoryStore + 'static>(store: Arc<S>) {
    let key = stocked(store.as_ref(), 10).await;
    let asks: [i64; 8] = [4, 3, 5, 2, 6, 1, 3, 2];

    let mut tasks = Vec::new();
    for quantity in asks {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let result = store.reserve_stock(hold(OrderId::new(), key, quantity)).await;
            (quantity, result)
        }));
    }

    let mut granted = 0;
    let mut refused = Vec::new();
    for task in tasks {
        let (quantity, result) = task.await.expect("reserve task panicked");
        match result {
            Ok(r) => granted += r.quantity,
            Err(InventoryError::InsufficientStock { .. }) => refused.push(quantity),
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    let (quantity, reserved, available) = counters(store.as_ref(), &key).await;
    assert_eq!(quantity, 10);
    assert_eq!(reserved, granted);
    assert!(reserved <= 10);
    assert!(!refused.is_empty());
    for q in refused {
        assert!(q > available, "refused {q} while {available} still available");
    }
}

/// Concurrent release and confirm of one reservation: exactly one wins.
pub async fn racing_settlements_apply_once<S: InventoryStore + 'static>(store: Arc<S>) {
    let key = stocked(store.as_ref(), 10).await;
    let reservation = store.reserve_stock(hold(OrderId::new(), key, 4)).await.unwrap();

    let releaser = {
        let store = store.clone();
        tokio::spawn(async move { store.release_reservation(reservation.id).await })
    };
    let confirmer = {
        let store = store.clone();
        tokio::spawn(async move { store.confirm_reservation(reservation.id).await })
    };
    let released = releaser.await.unwrap();
    let confirmed = confirmer.await.unwrap();

    match (released, confirmed) {
        (Ok(_), Err(InventoryError::AlreadyProcessed { status, .. })) => {
            assert_eq!(status, ReservationStatus::Released);
            assert_eq!(counters(store.as_ref(), &key).await, (10, 0, 10));
        }
        (Err(InventoryError::AlreadyProcessed { status, .. }), Ok(_)) => {
            assert_eq!(status, ReservationStatus::Confirmed);
            assert_eq!(counters(store.as_ref(), &key).await, (6, 0, 6));
        }
        other => panic!("expected exactly one settlement, got {other:?}"),
    }
    assert_eq!(store.list_movements(&key, 10).await.unwrap().len(), 2);
}

pub async fn release_is_inverse_of_reserve<S: InventoryStore + ?Sized>(store: &S) {
    let key = stocked(store, 25).await;
    store.reserve_stock(hold(OrderId::new(), key, 5)).await.unwrap();
    let before = counters(store, &key).await;

    let r = store.reserve_stock(hold(OrderId::new(), key, 7)).await.unwrap();
    store.release_reservation(r.id).await.unwrap();

    assert_eq!(counters(store, &key).await, before);
}

pub async fn confirm_keeps_availability<S: InventoryStore + ?Sized>(store: &S) {
    let key = stocked(store, 25).await;
    let r = store.reserve_stock(hold(OrderId::new(), key, 7)).await.unwrap();
    let (quantity, reserved, available) = counters(store, &key).await;

    store.confirm_reservation(r.id).await.unwrap();

    assert_eq!(
        counters(store, &key).await,
        (quantity - 7, reserved - 7, available)
    );
}

pub async fn terminal_reservations_are_not_reprocessed<S: InventoryStore + ?Sized>(store: &S) {
    let key = stocked(store, 10).await;
    let released = store.reserve_stock(hold(OrderId::new(), key, 2)).await.unwrap();
    let confirmed = store.reserve_stock(hold(OrderId::new(), key, 3)).await.unwrap();
    store.release_reservation(released.id).await.unwrap();
    store.confirm_reservation(confirmed.id).await.unwrap();

    let stock_before = counters(store, &key).await;
    let journal_before = store.list_movements(&key, 100).await.unwrap().len();

    for attempt in [
        store.release_reservation(released.id).await,
        store.confirm_reservation(released.id).await,
        store.release_reservation(confirmed.id).await,
        store.confirm_reservation(confirmed.id).await,
    ] {
        assert!(matches!(
            attempt,
            Err(InventoryError::AlreadyProcessed { .. })
        ));
    }

    assert_eq!(counters(store, &key).await, stock_before);
    assert_eq!(store.list_movements(&key, 100).await.unwrap().len(), journal_before);
    assert_eq!(
        store.get_reservation(released.id).await.unwrap().status,
        ReservationStatus::Released
    );
}

pub async fn one_signed_movement_per_transition<S: InventoryStore + ?Sized>(store: &S) {
    let key = stocked(store, 10).await;
    let order = OrderId::new();

    let a = store.reserve_stock(hold(order, key, 3)).await.unwrap();
    let b = store.reserve_stock(hold(order, key, 2)).await.unwrap();
    store.release_reservation(a.id).await.unwrap();
    store.confirm_reservation(b.id).await.unwrap();
    let _ = store.reserve_stock(hold(order, key, 50)).await.unwrap_err();

    // Newest first.
    let journal = store.list_movements(&key, 100).await.unwrap();
    let kinds: Vec<(MovementType, i64)> = journal
        .iter()
        .map(|m| (m.movement_type, m.quantity))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (MovementType::Sale, -2),
            (MovementType::Release, 3),
            (MovementType::Reservation, -2),
            (MovementType::Reservation, -3),
        ]
    );
    for m in &journal {
        assert_eq!(m.key, key);
        assert!(m.reference_id.is_some());
        assert_eq!(m.metadata["order_id"], serde_json::json!(order));
    }
}

pub async fn manual_movements_leave_counters_alone<S: InventoryStore + ?Sized>(store: &S) {
    let key = stocked(store, 10).await;

    store.update_stock(StockUpdate::new(key, 14)).await.unwrap();
    let entry = store
        .record_movement(
            NewMovement::restock(key, 4)
                .with_notes("cycle count")
                .with_metadata(serde_json::json!({ "counted_by": "night shift" })),
        )
        .await
        .unwrap();
    assert_eq!(entry.movement_type, MovementType::Restock);
    assert_eq!(entry.quantity, 4);

    assert_eq!(counters(store, &key).await, (14, 0, 14));
    let journal = store.list_movements(&key, 10).await.unwrap();
    assert_eq!(journal.len(), 1);
    assert_eq!(journal[0].id, entry.id);
    assert_eq!(journal[0].notes.as_deref(), Some("cycle count"));
    assert_eq!(journal[0].metadata["counted_by"], "night shift");
}

pub async fn manual_update_respects_reserved<S: InventoryStore + ?Sized>(store: &S) {
    let key = stocked(store, 10).await;
    store.reserve_stock(hold(OrderId::new(), key, 4)).await.unwrap();

    store.update_stock(StockUpdate::new(key, 20)).await.unwrap();
    assert_eq!(counters(store, &key).await, (20, 4, 16));

    store.update_stock(StockUpdate::new(key, 4)).await.unwrap();
    assert_eq!(counters(store, &key).await, (4, 4, 0));

    let err = store.update_stock(StockUpdate::new(key, 3)).await.unwrap_err();
    assert!(matches!(err, InventoryError::Validation(_)));
    let err = store.update_stock(StockUpdate::new(key, -1)).await.unwrap_err();
    assert!(matches!(err, InventoryError::Validation(_)));
    assert_eq!(counters(store, &key).await, (4, 4, 0));
}

pub async fn invalid_requests_are_rejected<S: InventoryStore + ?Sized>(store: &S) {
    let key = stocked(store, 10).await;
    for quantity in [0, -3] {
        let err = store
            .reserve_stock(hold(OrderId::new(), key, quantity))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));
    }
    let err = store.set_low_stock_threshold(&key, -1).await.unwrap_err();
    assert!(matches!(err, InventoryError::Validation(_)));

    assert_eq!(counters(store, &key).await, (10, 0, 10));
    assert!(store.list_movements(&key, 10).await.unwrap().is_empty());
}

pub async fn unknown_rows<S: InventoryStore + ?Sized>(store: &S) {
    let key = fresh_key();
    assert_eq!(counters(store, &key).await, (0, 0, 0));

    let err = store.reserve_stock(hold(OrderId::new(), key, 1)).await.unwrap_err();
    assert!(matches!(
        err,
        InventoryError::InsufficientStock { requested: 1, available: 0, .. }
    ));

    let missing = stockroom_core::ReservationId::new();
    assert!(matches!(
        store.release_reservation(missing).await,
        Err(InventoryError::NotFound(_))
    ));
    assert!(matches!(
        store.confirm_reservation(missing).await,
        Err(InventoryError::NotFound(_))
    ));
    assert!(matches!(
        store.get_reservation(missing).await,
        Err(InventoryError::NotFound(_))
    ));
    assert!(store
        .get_reservations_by_order(OrderId::new())
        .await
        .unwrap()
        .is_empty());
}

pub async fn variants_are_tracked_separately<S: InventoryStore + ?Sized>(store: &S) {
    let product = ProductId::new();
    let base = StockKey::product(product);
    let red = StockKey::variant(product, VariantId::new());
    let blue = StockKey::variant(product, VariantId::new());

    store.update_stock(StockUpdate::new(base, 5)).await.unwrap();
    store.update_stock(StockUpdate::new(red, 2)).await.unwrap();

    store.reserve_stock(hold(OrderId::new(), red, 2)).await.unwrap();
    let err = store.reserve_stock(hold(OrderId::new(), blue, 1)).await.unwrap_err();
    assert!(matches!(err, InventoryError::InsufficientStock { .. }));

    assert_eq!(counters(store, &base).await, (5, 0, 5));
    assert_eq!(counters(store, &red).await, (2, 2, 0));
    assert_eq!(counters(store, &blue).await, (0, 0, 0));
    assert_eq!(store.list_movements(&base, 10).await.unwrap().len(), 0);
    assert_eq!(store.list_movements(&red, 10).await.unwrap().len(), 1);
}

pub async fn order_batches<S: InventoryStore + ?Sized>(store: &S) {
    let product = ProductId::new();
    let shirt = StockKey::product(product);
    let shirt_xl = StockKey::variant(product, VariantId::new());
    store.update_stock(StockUpdate::new(shirt, 10)).await.unwrap();
    store.update_stock(StockUpdate::new(shirt_xl, 10)).await.unwrap();

    let paid = OrderId::new();
    let a = store.reserve_stock(hold(paid, shirt, 2)).await.unwrap();
    let b = store.reserve_stock(hold(paid, shirt_xl, 3)).await.unwrap();
    let c = store.reserve_stock(hold(paid, shirt, 1)).await.unwrap();
    store.release_reservation(c.id).await.unwrap();

    let cancelled = OrderId::new();
    store.reserve_stock(hold(cancelled, shirt, 4)).await.unwrap();

    let confirmed = store.confirm_order_reservations(paid).await.unwrap();
    let mut ids: Vec<_> = confirmed.iter().map(|r| r.id).collect();
    ids.sort();
    let mut expected = vec![a.id, b.id];
    expected.sort();
    assert_eq!(ids, expected);
    assert!(confirmed.iter().all(|r| r.status == ReservationStatus::Confirmed));

    let released = store.release_order_reservations(cancelled).await.unwrap();
    assert_eq!(released.len(), 1);

    assert_eq!(counters(store, &shirt).await, (8, 0, 8));
    assert_eq!(counters(store, &shirt_xl).await, (7, 0, 7));

    // Nothing left to settle.
    assert!(store.confirm_order_reservations(paid).await.unwrap().is_empty());
    assert!(store.release_order_reservations(paid).await.unwrap().is_empty());

    let statuses: Vec<ReservationStatus> = store
        .get_reservations_by_order(paid)
        .await
        .unwrap()
        .iter()
        .map(|r| r.status)
        .collect();
    assert_eq!(statuses.len(), 3);
    assert_eq!(
        statuses.iter().filter(|s| **s == ReservationStatus::Confirmed).count(),
        2
    );
    assert!(statuses.contains(&ReservationStatus::Released));
}

pub async fn low_stock_report<S: InventoryStore + ?Sized>(store: &S) {
    let storefront = StorefrontId::new();
    let elsewhere = StorefrontId::new();

    let scarce = fresh_key();
    let plenty = fresh_key();
    let untracked = fresh_key();
    let foreign = fresh_key();

    for (key, quantity, front, name) in [
        (scarce, 3, storefront, "Espresso beans"),
        (plenty, 50, storefront, "Filter papers"),
        (untracked, 1, storefront, "Gift card"),
        (foreign, 1, elsewhere, "Mug"),
    ] {
        store
            .update_stock(
                StockUpdate::new(key, quantity)
                    .with_storefront(front)
                    .with_product_name(name),
            )
            .await
            .unwrap();
    }
    store.set_low_stock_threshold(&scarce, 5).await.unwrap();
    store.set_low_stock_threshold(&plenty, 10).await.unwrap();
    store.set_low_stock_threshold(&foreign, 5).await.unwrap();

    let report = store.get_low_stock_items(storefront).await.unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].product_id, scarce.product_id);
    assert_eq!(report[0].product_name, "Espresso beans");
    assert_eq!(report[0].low_stock_threshold, 5);

    // Holds count against availability.
    store.reserve_stock(hold(OrderId::new(), plenty, 41)).await.unwrap();
    let report = store.get_low_stock_items(storefront).await.unwrap();
    let names: Vec<&str> = report.iter().map(|i| i.product_name.as_str()).collect();
    assert_eq!(names, vec!["Espresso beans", "Filter papers"]);
    assert_eq!(report[1].quantity, 50);
    assert_eq!(report[1].available_quantity, 9);

    // Threshold 0 switches reporting off.
    store.set_low_stock_threshold(&scarce, 0).await.unwrap();
    let report = store.get_low_stock_items(storefront).await.unwrap();
    assert_eq!(report.len(), 1);
}

pub async fn stock_metadata_is_merged<S: InventoryStore + ?Sized>(store: &S) {
    let storefront = StorefrontId::new();
    let key = StockKey::variant(ProductId::new(), VariantId::new());

    store
        .update_stock(
            StockUpdate::new(key, 5)
                .with_storefront(storefront)
                .with_product_name("Hoodie")
                .with_variant_name("Large"),
        )
        .await
        .unwrap();
    let updated = store.update_stock(StockUpdate::new(key, 8)).await.unwrap();

    assert_eq!(updated.quantity, 8);
    assert_eq!(updated.storefront_id, Some(storefront));
    assert_eq!(updated.product_name.as_deref(), Some("Hoodie"));
    assert_eq!(updated.variant_name.as_deref(), Some("Large"));
}
