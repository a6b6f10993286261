use serde::{Deserialize, Serialize};

use stockroom_core::{ProductId, VariantId};

use crate::stock::StockRecord;

/// Row of the low-stock report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockItem {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub quantity: i64,
    pub available_quantity: i64,
    pub low_stock_threshold: i64,
}

impl LowStockItem {
    /// `Some` only when the record is at or below a positive threshold.
    pub fn from_record(record: &StockRecord) -> Option<Self> {
        if !record.is_low_stock() {
            return None;
        }
        Some(Self {
            product_id: record.key.product_id,
            variant_id: record.key.variant_id,
            product_name: record.product_name.clone().unwrap_or_default(),
            variant_name: record.variant_name.clone(),
            quantity: record.quantity,
            available_quantity: record.available_quantity,
            low_stock_threshold: record.low_stock_threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock::{StockKey, StockUpdate};
    use chrono::Utc;

    #[test]
    fn only_rows_at_or_below_threshold_are_reported() {
        let key = StockKey::product(ProductId::new());
        let record = StockRecord::empty(key, Utc::now())
            .apply_update(&StockUpdate::new(key, 4).with_product_name("Kettle"), Utc::now())
            .unwrap();
        assert!(LowStockItem::from_record(&record).is_none());

        let record = record.with_low_stock_threshold(4, Utc::now()).unwrap();
        let item = LowStockItem::from_record(&record).unwrap();
        assert_eq!(item.product_name, "Kettle");
        assert_eq!(item.available_quantity, 4);
        assert_eq!(item.low_stock_threshold, 4);
    }
}
