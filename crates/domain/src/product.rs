//! The inventory-bearing half of a catalog product.

use chrono::{DateTime, Utc};
use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::money::Money;

/// A catalog product as seen by the checkout.
///
/// `stock` is the single source of truth for availability and is never
/// allowed to go below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Creates a new product, validating name and price.
    pub fn new(name: impl Into<String>, price: Money, stock: u32) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::ProductNameRequired);
        }
        if !price.is_positive() {
            return Err(DomainError::InvalidPrice {
                cents: price.cents(),
            });
        }

        let now = Utc::now();
        Ok(Self {
            id: ProductId::new(),
            name,
            price,
            stock,
            created_at: now,
            updated_at: now,
        })
    }

    /// Removes `quantity` units from stock.
    ///
    /// Leaves the product untouched and fails if that would take stock below
    /// zero.
    pub fn remove_stock(&mut self, quantity: u32) -> Result<(), DomainError> {
        let remaining =
            self.stock
                .checked_sub(quantity)
                .ok_or(DomainError::InsufficientStock {
                    product_id: self.id,
                    requested: quantity,
                    available: self.stock,
                })?;
        self.stock = remaining;
        self.updated_at = Utc::now();
        Ok(())
    }
}
