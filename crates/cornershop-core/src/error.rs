//! Error types for the domain model.

use thiserror::Error;

/// Validation errors for products and sales.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("product name cannot be empty")]
    EmptyProductName,

    #[error("product category cannot be empty")]
    EmptyCategory,

    #[error("price of {name} cannot be negative: {price}")]
    NegativePrice { name: String, price: String },

    #[error("stock of {name} cannot be negative: {stock}")]
    NegativeStock { name: String, stock: i64 },

    #[error("sale must contain at least one item")]
    EmptySale,

    #[error("quantity of {name} must be positive, got {quantity}")]
    NonPositiveQuantity { name: String, quantity: i64 },

    #[error("sale total {recorded} does not match its items ({computed})")]
    TotalMismatch { recorded: String, computed: String },

    #[error("invalid sale id: {0}")]
    InvalidSaleId(String),
}
