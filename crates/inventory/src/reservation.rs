use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, OrderId, ReservationId};

use crate::stock::StockKey;

/// Reservation lifecycle.
///
/// ```text
/// reserved --confirm--> confirmed
/// reserved --release--> released
/// ```
///
/// Both `confirmed` and `released` are terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Reserved,
    Released,
    Confirmed,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Reserved => "reserved",
            ReservationStatus::Released => "released",
            ReservationStatus::Confirmed => "confirmed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Reserved)
    }

    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        matches!(
            (self, next),
            (ReservationStatus::Reserved, ReservationStatus::Released)
                | (ReservationStatus::Reserved, ReservationStatus::Confirmed)
        )
    }
}

impl core::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reserved" => Ok(ReservationStatus::Reserved),
            "released" => Ok(ReservationStatus::Released),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            other => Err(DomainError::validation(format!(
                "unknown reservation status '{other}'"
            ))),
        }
    }
}

/// Command: hold stock for an order until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveStock {
    pub order_id: OrderId,
    pub key: StockKey,
    pub quantity: i64,
    pub expires_at: DateTime<Utc>,
}

impl ReserveStock {
    pub fn new(order_id: OrderId, key: StockKey, quantity: i64, expires_at: DateTime<Utc>) -> Self {
        Self {
            order_id,
            key,
            quantity,
            expires_at,
        }
    }

    /// Reservations are all-or-nothing and must hold at least one unit.
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity <= 0 {
            return Err(DomainError::validation("reservation quantity must be positive"));
        }
        Ok(())
    }
}

/// A time-bounded hold against available stock, tied to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub order_id: OrderId,
    pub key: StockKey,
    pub quantity: i64,
    pub status: ReservationStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Build the `reserved` row for an accepted command.
    pub fn open(id: ReservationId, cmd: &ReserveStock, now: DateTime<Utc>) -> DomainResult<Self> {
        cmd.validate()?;
        Ok(Self {
            id,
            order_id: cmd.order_id,
            key: cmd.key,
            quantity: cmd.quantity,
            status: ReservationStatus::Reserved,
            expires_at: cmd.expires_at,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Still holding stock past its expiry marker.
    pub fn is_expired(&self, as_of: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at < as_of
    }

    pub fn release(&self, now: DateTime<Utc>) -> DomainResult<Self> {
        self.transition(ReservationStatus::Released, now)
    }

    pub fn confirm(&self, now: DateTime<Utc>) -> DomainResult<Self> {
        self.transition(ReservationStatus::Confirmed, now)
    }

    fn transition(&self, next: ReservationStatus, now: DateTime<Utc>) -> DomainResult<Self> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::conflict(format!(
                "reservation {} is already {}",
                self.id, self.status
            )));
        }
        let mut updated = self.clone();
        updated.status = next;
        updated.updated_at = now;
        Ok(updated)
    }
}
