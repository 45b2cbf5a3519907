//! Products: the shop's catalogue and stock levels.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::sale::round_money;

/// Identity key for a product name.
///
/// Product names are unique ignoring case, so both stores and the engine key
/// products by the lower-cased name.
pub fn product_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A product in the shop's catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Display name; also the identity (case-insensitive).
    pub name: String,
    /// Free-form category used to group the stock report.
    pub category: String,
    /// Unit price, two fractional digits.
    pub price: Decimal,
    /// Units on hand. Never negative at rest.
    pub stock_quantity: i64,
}

impl Product {
    /// Create a product, normalising the price to two fractional digits.
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        price: Decimal,
        stock_quantity: i64,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            price: round_money(price),
            stock_quantity,
        }
    }

    /// The identity key of this product.
    pub fn key(&self) -> String {
        product_key(&self.name)
    }

    /// Whether `other` names the same product.
    pub fn same_identity(&self, other: &Product) -> bool {
        self.key() == other.key()
    }

    /// Copy of this product with a different stock level.
    pub fn with_stock(&self, stock_quantity: i64) -> Self {
        Self {
            stock_quantity,
            ..self.clone()
        }
    }

    /// Whether the descriptive fields (category, price) match.
    pub fn same_details(&self, other: &Product) -> bool {
        self.category == other.category && self.price == other.price
    }
}
