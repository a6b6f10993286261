//! Inventory operation errors.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `InventoryError::TransactionFailure`, keeping the
//! SQLSTATE so callers can decide on a retry policy:
//!
//! | SQLx Error | PostgreSQL Error Code | Meaning |
//! |------------|----------------------|---------|
//! | Database (unique violation) | `23505` | Duplicate stock key or id |
//! | Database (check violation) | `23514` | Stock invariant rejected by the schema |
//! | Database (serialization failure) | `40001` | Retryable |
//! | Database (deadlock detected) | `40P01` | Retryable |
//! | PoolClosed / RowNotFound / Other | N/A | Not retryable |
//!
//! The engine never retries on its own.

use thiserror::Error;

use stockroom_core::{DomainError, ReservationId};
use stockroom_inventory::{ReservationStatus, StockKey};

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const CHECK_VIOLATION: &str = "23514";

#[derive(Debug, Error)]
pub enum InventoryError {
    /// No reservation (or other addressed row) exists.
    #[error("not found: {0}")]
    NotFound(String),

    /// The conditional reserve matched no row: availability is too low.
    #[error("insufficient stock for {key}: requested {requested}, available {available}")]
    InsufficientStock {
        key: StockKey,
        requested: i64,
        available: i64,
    },

    /// Release/confirm targeted a reservation that is no longer `reserved`.
    #[error("reservation {reservation_id} already processed (status: {status})")]
    AlreadyProcessed {
        reservation_id: ReservationId,
        status: ReservationStatus,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    /// Any other persistence failure, tagged with the operation that hit it.
    #[error("transaction failed in {operation}: {message}")]
    TransactionFailure {
        operation: &'static str,
        message: String,
        sqlstate: Option<String>,
    },
}

impl InventoryError {
    pub fn reservation_not_found(id: ReservationId) -> Self {
        Self::NotFound(format!("reservation {id}"))
    }

    pub fn transaction(operation: &'static str, message: impl Into<String>) -> Self {
        Self::TransactionFailure {
            operation,
            message: message.into(),
            sqlstate: None,
        }
    }

    /// Lift a domain error raised while running `operation`.
    pub fn from_domain(operation: &'static str, err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
            DomainError::InvariantViolation(msg) | DomainError::Conflict(msg) => {
                Self::transaction(operation, msg)
            }
        }
    }

    /// Lock-wait casualties the caller may safely retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransactionFailure {
                sqlstate: Some(code),
                ..
            } => code == SERIALIZATION_FAILURE || code == DEADLOCK_DETECTED,
            _ => false,
        }
    }
}

impl From<DomainError> for InventoryError {
    fn from(err: DomainError) -> Self {
        Self::from_domain("domain", err)
    }
}

/// Map SQLx errors to `InventoryError`.
pub(crate) fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> InventoryError {
    match err {
        sqlx::Error::Database(db_err) => InventoryError::TransactionFailure {
            operation,
            message: format!("database error: {}", db_err.message()),
            sqlstate: db_err.code().map(|c| c.into_owned()),
        },
        sqlx::Error::PoolClosed => InventoryError::transaction(operation, "connection pool closed"),
        sqlx::Error::RowNotFound => InventoryError::transaction(operation, "unexpected row not found"),
        other => InventoryError::transaction(operation, format!("sqlx error: {other}")),
    }
}

pub(crate) fn is_check_violation(err: &sqlx::Error) -> bool {
    has_code(err, CHECK_VIOLATION)
}

fn has_code(err: &sqlx::Error, expected: &str) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == expected;
        }
    }
    false
}
