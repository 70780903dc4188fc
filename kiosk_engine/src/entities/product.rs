use chrono::{DateTime, Utc};
use kiosk_common::Money;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{ProductId, ProductStatus},
    traits::ShopError,
};

/// Sentinel stock value meaning "never runs out".
pub const UNLIMITED_STOCK: i64 = -1;

/// A digital product with a stock counter.
///
/// The stock counter is the only contended mutable resource in the core; it is protected by the
/// store's version check (see [`UnitOfWork::update_product`](crate::traits::UnitOfWork)), not by
/// any in-memory lock. `version` is the value the row had when this instance was fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Money,
    /// Subscription length granted on delivery. 0 means permanent access.
    pub duration_days: i64,
    pub stock: i64,
    pub status: ProductStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        price: Money,
        duration_days: i64,
        stock: i64,
    ) -> Result<Self, ShopError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ShopError::Validation("Product name cannot be empty".into()));
        }
        if stock < UNLIMITED_STOCK {
            return Err(ShopError::Validation(format!("Stock must be -1 (unlimited) or >= 0, got {stock}")));
        }
        if duration_days < 0 {
            return Err(ShopError::Validation(format!("Duration cannot be negative, got {duration_days}")));
        }
        let now = Utc::now();
        let status = if stock == 0 { ProductStatus::OutOfStock } else { ProductStatus::Active };
        Ok(Self {
            id: ProductId::random(),
            name,
            description: description.into(),
            price,
            duration_days,
            stock,
            status,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_unlimited(&self) -> bool {
        self.stock == UNLIMITED_STOCK
    }

    pub fn is_available(&self) -> bool {
        self.status == ProductStatus::Active && (self.is_unlimited() || self.stock > 0)
    }

    pub fn has_sufficient_stock(&self, quantity: i64) -> bool {
        self.is_unlimited() || self.stock >= quantity
    }

    /// Reserves `quantity` units. A no-op for unlimited stock. Hitting zero flips the product to
    /// `out_of_stock`.
    pub fn decrease_stock(&mut self, quantity: i64) -> Result<(), ShopError> {
        if self.is_unlimited() {
            return Ok(());
        }
        if self.stock < quantity {
            return Err(ShopError::InsufficientStock(self.id.clone()));
        }
        self.stock -= quantity;
        if self.stock == 0 {
            self.status = ProductStatus::OutOfStock;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Releases `quantity` units back. A no-op for unlimited stock. Revives an `out_of_stock`
    /// product once stock is positive again.
    pub fn increase_stock(&mut self, quantity: i64) {
        if self.is_unlimited() {
            return;
        }
        self.stock += quantity;
        if self.status == ProductStatus::OutOfStock && self.stock > 0 {
            self.status = ProductStatus::Active;
        }
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod test {
    use kiosk_common::Currency;

    use super::*;

    fn product(stock: i64) -> Product {
        let price = Money::from_cents(1000, Currency::USD).unwrap();
        Product::new("Test key", "A license key", price, 30, stock).unwrap()
    }

    #[test]
    fn unlimited_stock_is_a_no_op_in_both_directions() {
        let mut p = product(UNLIMITED_STOCK);
        p.decrease_stock(5).unwrap();
        assert_eq!(p.stock, UNLIMITED_STOCK);
        p.increase_stock(5);
        assert_eq!(p.stock, UNLIMITED_STOCK);
        assert!(p.is_available());
    }

    #[test]
    fn decrease_then_increase_round_trips() {
        let mut p = product(7);
        p.decrease_stock(3).unwrap();
        assert_eq!(p.stock, 4);
        p.increase_stock(3);
        assert_eq!(p.stock, 7);
        assert_eq!(p.status, ProductStatus::Active);
    }

    #[test]
    fn insufficient_stock_is_a_typed_error_and_leaves_stock_unchanged() {
        let mut p = product(2);
        let err = p.decrease_stock(3).unwrap_err();
        assert!(matches!(err, ShopError::InsufficientStock(_)));
        assert_eq!(p.stock, 2);
    }

    #[test]
    fn stock_zero_flips_status_and_restock_revives_it() {
        let mut p = product(2);
        p.decrease_stock(2).unwrap();
        assert_eq!(p.status, ProductStatus::OutOfStock);
        assert!(!p.is_available());
        p.increase_stock(1);
        assert_eq!(p.status, ProductStatus::Active);
        assert!(p.is_available());
    }

    #[test]
    fn stock_below_minus_one_is_rejected() {
        let price = Money::from_cents(1000, Currency::USD).unwrap();
        assert!(Product::new("x", "y", price, 0, -2).is_err());
    }
}
