//! Shared building blocks for the inventory engine: typed ids and errors.
//!
//! This crate contains **pure** primitives (no storage, no IO): identifiers
//! and the domain error model.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{MovementId, OrderId, ProductId, ReservationId, StorefrontId, VariantId};
