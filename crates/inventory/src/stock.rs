use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, ProductId, StorefrontId, VariantId};

/// Identifies one stock row: a product, optionally narrowed to a variant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
}

impl StockKey {
    pub fn new(product_id: ProductId, variant_id: Option<VariantId>) -> Self {
        Self {
            product_id,
            variant_id,
        }
    }

    /// Stock tracked at product level (no variant).
    pub fn product(product_id: ProductId) -> Self {
        Self::new(product_id, None)
    }

    pub fn variant(product_id: ProductId, variant_id: VariantId) -> Self {
        Self::new(product_id, Some(variant_id))
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.variant_id {
            Some(v) => write!(f, "{}/{}", self.product_id, v),
            None => write!(f, "{}", self.product_id),
        }
    }
}

/// Absolute on-hand quantity for a stock row, as set by a manual adjustment.
///
/// Catalog metadata (`storefront_id`, display names) is merged into the row
/// when present and left untouched when `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUpdate {
    pub key: StockKey,
    pub quantity: i64,
    pub storefront_id: Option<StorefrontId>,
    pub product_name: Option<String>,
    pub variant_name: Option<String>,
}

impl StockUpdate {
    pub fn new(key: StockKey, quantity: i64) -> Self {
        Self {
            key,
            quantity,
            storefront_id: None,
            product_name: None,
            variant_name: None,
        }
    }

    pub fn with_storefront(mut self, storefront_id: StorefrontId) -> Self {
        self.storefront_id = Some(storefront_id);
        self
    }

    pub fn with_product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = Some(name.into());
        self
    }

    pub fn with_variant_name(mut self, name: impl Into<String>) -> Self {
        self.variant_name = Some(name.into());
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity < 0 {
            return Err(DomainError::validation("stock quantity cannot be negative"));
        }
        Ok(())
    }
}

/// Per-(product, variant) stock counters.
///
/// Invariants (checked by [`StockRecord::check_invariants`] and enforced by
/// every transition below):
/// - `available_quantity == quantity - reserved_quantity`
/// - `0 <= reserved_quantity <= quantity`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub key: StockKey,
    pub storefront_id: Option<StorefrontId>,
    pub product_name: Option<String>,
    pub variant_name: Option<String>,
    /// Units physically owned.
    pub quantity: i64,
    /// Units held by active reservations.
    pub reserved_quantity: i64,
    /// Units sellable right now.
    pub available_quantity: i64,
    /// `0` disables low-stock reporting for the row.
    pub low_stock_threshold: i64,
    pub updated_at: DateTime<Utc>,
}

impl StockRecord {
    /// Zero-valued record for a key that has no row yet.
    pub fn empty(key: StockKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            storefront_id: None,
            product_name: None,
            variant_name: None,
            quantity: 0,
            reserved_quantity: 0,
            available_quantity: 0,
            low_stock_threshold: 0,
            updated_at: now,
        }
    }

    pub fn check_invariants(&self) -> DomainResult<()> {
        if self.reserved_quantity < 0 {
            return Err(DomainError::invariant("reserved quantity is negative"));
        }
        if self.reserved_quantity > self.quantity {
            return Err(DomainError::invariant("reserved quantity exceeds quantity"));
        }
        if self.available_quantity != self.quantity - self.reserved_quantity {
            return Err(DomainError::invariant(
                "available quantity out of sync with quantity - reserved",
            ));
        }
        Ok(())
    }

    /// Whether the row should appear in the low-stock report.
    pub fn is_low_stock(&self) -> bool {
        self.low_stock_threshold > 0 && self.available_quantity <= self.low_stock_threshold
    }

    /// Set the absolute on-hand quantity; reserved units are left alone.
    pub fn apply_update(&self, update: &StockUpdate, now: DateTime<Utc>) -> DomainResult<Self> {
        update.validate()?;
        if update.key != self.key {
            return Err(DomainError::invariant("stock key mismatch"));
        }
        if update.quantity < self.reserved_quantity {
            return Err(DomainError::validation(format!(
                "quantity {} is below reserved quantity {}",
                update.quantity, self.reserved_quantity
            )));
        }

        let mut next = self.clone();
        next.quantity = update.quantity;
        next.available_quantity = update.quantity - self.reserved_quantity;
        if update.storefront_id.is_some() {
            next.storefront_id = update.storefront_id;
        }
        if update.product_name.is_some() {
            next.product_name = update.product_name.clone();
        }
        if update.variant_name.is_some() {
            next.variant_name = update.variant_name.clone();
        }
        next.updated_at = now;
        Ok(next)
    }

    /// Conditionally hold `quantity` units.
    ///
    /// Returns `None` when fewer than `quantity` units are available; the
    /// record is left unchanged in that case.
    pub fn try_reserve(&self, quantity: i64, now: DateTime<Utc>) -> Option<Self> {
        if quantity <= 0 || self.available_quantity < quantity {
            return None;
        }
        let mut next = self.clone();
        next.reserved_quantity += quantity;
        next.available_quantity = next.quantity - next.reserved_quantity;
        next.updated_at = now;
        Some(next)
    }

    /// Return held units to availability.
    pub fn release(&self, quantity: i64, now: DateTime<Utc>) -> DomainResult<Self> {
        self.ensure_held(quantity)?;
        let mut next = self.clone();
        next.reserved_quantity -= quantity;
        next.available_quantity += quantity;
        next.updated_at = now;
        Ok(next)
    }

    /// Turn held units into a sale: they leave both `quantity` and
    /// `reserved_quantity`, so availability does not move.
    pub fn consume(&self, quantity: i64, now: DateTime<Utc>) -> DomainResult<Self> {
        self.ensure_held(quantity)?;
        let mut next = self.clone();
        next.quantity -= quantity;
        next.reserved_quantity -= quantity;
        next.updated_at = now;
        Ok(next)
    }

    pub fn with_low_stock_threshold(&self, threshold: i64, now: DateTime<Utc>) -> DomainResult<Self> {
        if threshold < 0 {
            return Err(DomainError::validation("low stock threshold cannot be negative"));
        }
        let mut next = self.clone();
        next.low_stock_threshold = threshold;
        next.updated_at = now;
        Ok(next)
    }

    fn ensure_held(&self, quantity: i64) -> DomainResult<()> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if self.reserved_quantity < quantity {
            return Err(DomainError::invariant(format!(
                "cannot settle {} units, only {} reserved",
                quantity, self.reserved_quantity
            )));
        }
        Ok(())
    }
}
