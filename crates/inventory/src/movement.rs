use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use stockroom_core::{DomainError, DomainResult, MovementId};

use crate::reservation::Reservation;
use crate::stock::StockKey;

/// Kind of stock-affecting event recorded in the journal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Units moved from available to reserved (negative).
    Reservation,
    /// Held units returned to availability (positive).
    Release,
    /// Held units consumed by a confirmed order (negative).
    Sale,
    /// Manual on-hand adjustment, paired with `UpdateStock`.
    Restock,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Reservation => "reservation",
            MovementType::Release => "release",
            MovementType::Sale => "sale",
            MovementType::Restock => "restock",
        }
    }

    fn accepts(&self, quantity: i64) -> bool {
        match self {
            MovementType::Reservation | MovementType::Sale => quantity < 0,
            MovementType::Release => quantity > 0,
            MovementType::Restock => quantity != 0,
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reservation" => Ok(MovementType::Reservation),
            "release" => Ok(MovementType::Release),
            "sale" => Ok(MovementType::Sale),
            "restock" => Ok(MovementType::Restock),
            other => Err(DomainError::validation(format!("unknown movement type '{other}'"))),
        }
    }
}

/// What a movement's `reference_id` points at.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Reservation,
    Order,
    Manual,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Reservation => "reservation",
            ReferenceType::Order => "order",
            ReferenceType::Manual => "manual",
        }
    }
}

impl FromStr for ReferenceType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reservation" => Ok(ReferenceType::Reservation),
            "order" => Ok(ReferenceType::Order),
            "manual" => Ok(ReferenceType::Manual),
            other => Err(DomainError::validation(format!("unknown reference type '{other}'"))),
        }
    }
}

/// A journal entry that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMovement {
    pub key: StockKey,
    pub movement_type: MovementType,
    /// Signed: negative takes units out of availability or ownership.
    pub quantity: i64,
    pub reference_type: Option<ReferenceType>,
    pub reference_id: Option<Uuid>,
    pub notes: Option<String>,
    /// Opaque JSON object; `{}` when nothing is attached.
    pub metadata: JsonValue,
}

impl NewMovement {
    pub fn new(key: StockKey, movement_type: MovementType, quantity: i64) -> Self {
        Self {
            key,
            movement_type,
            quantity,
            reference_type: None,
            reference_id: None,
            notes: None,
            metadata: json!({}),
        }
    }

    /// Debit of availability for a freshly created hold.
    pub fn for_reservation(reservation: &Reservation) -> Self {
        Self::from_reservation(reservation, MovementType::Reservation, -reservation.quantity)
    }

    /// Credit of availability when a hold is released.
    pub fn for_release(reservation: &Reservation) -> Self {
        Self::from_reservation(reservation, MovementType::Release, reservation.quantity)
    }

    /// Units leaving the warehouse when a hold is confirmed.
    pub fn for_sale(reservation: &Reservation) -> Self {
        Self::from_reservation(reservation, MovementType::Sale, -reservation.quantity)
    }

    /// Manual adjustment (positive for incoming goods, negative for write-offs).
    pub fn restock(key: StockKey, quantity: i64) -> Self {
        Self::new(key, MovementType::Restock, quantity).with_reference(ReferenceType::Manual, None)
    }

    pub fn with_reference(mut self, reference_type: ReferenceType, reference_id: Option<Uuid>) -> Self {
        self.reference_type = Some(reference_type);
        self.reference_id = reference_id;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if !self.movement_type.accepts(self.quantity) {
            return Err(DomainError::validation(format!(
                "{} movement cannot have quantity {}",
                self.movement_type, self.quantity
            )));
        }
        if !(self.metadata.is_object() || self.metadata.is_null()) {
            return Err(DomainError::validation("movement metadata must be a JSON object"));
        }
        Ok(())
    }

    fn from_reservation(reservation: &Reservation, movement_type: MovementType, quantity: i64) -> Self {
        Self::new(reservation.key, movement_type, quantity)
            .with_reference(ReferenceType::Reservation, Some(*reservation.id.as_uuid()))
            .with_metadata(json!({ "order_id": reservation.order_id }))
    }
}

/// Immutable audit entry. Never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub key: StockKey,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub reference_type: Option<ReferenceType>,
    pub reference_id: Option<Uuid>,
    pub notes: Option<String>,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl Movement {
    pub fn record(id: MovementId, entry: NewMovement, now: DateTime<Utc>) -> DomainResult<Self> {
        entry.validate()?;
        Ok(Self {
            id,
            key: entry.key,
            movement_type: entry.movement_type,
            quantity: entry.quantity,
            reference_type: entry.reference_type,
            reference_id: entry.reference_id,
            notes: entry.notes,
            metadata: if entry.metadata.is_null() { json!({}) } else { entry.metadata },
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::ReserveStock;
    use chrono::Duration;
    use stockroom_core::{OrderId, ProductId, ReservationId};

    fn reservation(quantity: i64) -> Reservation {
        let cmd = ReserveStock::new(
            OrderId::new(),
            StockKey::product(ProductId::new()),
            quantity,
            Utc::now() + Duration::minutes(10),
        );
        Reservation::open(ReservationId::new(), &cmd, Utc::now()).unwrap()
    }

    #[test]
    fn lifecycle_movements_carry_the_right_sign() {
        let r = reservation(3);
        assert_eq!(NewMovement::for_reservation(&r).quantity, -3);
        assert_eq!(NewMovement::for_release(&r).quantity, 3);
        assert_eq!(NewMovement::for_sale(&r).quantity, -3);
        for m in [
            NewMovement::for_reservation(&r),
            NewMovement::for_release(&r),
            NewMovement::for_sale(&r),
        ] {
            m.validate().unwrap();
            assert_eq!(m.reference_type, Some(ReferenceType::Reservation));
            assert_eq!(m.reference_id, Some(*r.id.as_uuid()));
        }
    }

    #[test]
    fn wrong_sign_is_rejected() {
        let key = StockKey::product(ProductId::new());
        assert!(NewMovement::new(key, MovementType::Release, -1).validate().is_err());
        assert!(NewMovement::new(key, MovementType::Sale, 1).validate().is_err());
        assert!(NewMovement::new(key, MovementType::Reservation, 0).validate().is_err());
        assert!(NewMovement::restock(key, 0).validate().is_err());
        NewMovement::restock(key, -4).validate().unwrap();
    }

    #[test]
    fn metadata_must_be_an_object() {
        let key = StockKey::product(ProductId::new());
        let m = NewMovement::restock(key, 5).with_metadata(json!([1, 2]));
        assert!(m.validate().is_err());
    }

    #[test]
    fn null_metadata_is_stored_as_empty_object() {
        let key = StockKey::product(ProductId::new());
        let entry = NewMovement::restock(key, 5)
            .with_notes("supplier delivery")
            .with_metadata(JsonValue::Null);
        let m = Movement::record(MovementId::new(), entry, Utc::now()).unwrap();
        assert_eq!(m.metadata, json!({}));
        assert_eq!(m.notes.as_deref(), Some("supplier delivery"));
    }

    #[test]
    fn type_names_parse_back() {
        for t in [
            MovementType::Reservation,
            MovementType::Release,
            MovementType::Sale,
            MovementType::Restock,
        ] {
            assert_eq!(t.as_str().parse::<MovementType>().unwrap(), t);
        }
        assert_eq!("order".parse::<ReferenceType>().unwrap(), ReferenceType::Order);
    }
}
