//! Error types for the shop.

use cornershop_core::{SaleId, ValidationError};
use cornershop_store::StoreError;
use cornershop_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during shop operations.
#[derive(Debug, Error)]
pub enum ShopError {
    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Search term was blank.
    #[error("search term cannot be empty")]
    EmptySearchTerm,

    /// Product name was blank.
    #[error("product name cannot be empty")]
    EmptyProductName,

    /// Product not found in the active store.
    #[error("product not found: {0}")]
    ProductNotFound(String),

    /// A product with this name already exists.
    #[error("product already exists: {0}")]
    ProductExists(String),

    /// Not enough units to sell.
    #[error("not enough stock for {name}: only {available} units available, {requested} requested")]
    InsufficientStock {
        name: String,
        available: i64,
        requested: i64,
    },

    /// A sale needs at least one item.
    #[error("a sale needs at least one item")]
    EmptySale,

    /// Quantities must be positive.
    #[error("invalid quantity {quantity} for {name}")]
    InvalidQuantity { name: String, quantity: i64 },

    /// Sale not found in the active store.
    #[error("sale not found: {0}")]
    SaleNotFound(SaleId),

    /// A stock adjustment of zero units.
    #[error("stock adjustment for {0} cannot be zero")]
    ZeroAdjustment(String),
}

/// Result type for shop operations.
pub type Result<T> = std::result::Result<T, ShopError>;
