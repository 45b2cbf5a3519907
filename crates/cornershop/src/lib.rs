//! # Corner Shop
//!
//! Inventory and sales for a corner shop, held in two stores that are kept
//! in step by a reconciliation engine.
//!
//! ## Overview
//!
//! The shop writes to one active store at a time:
//!
//! - **Document store**: JSON collections of products and sales
//! - **Relational store**: SQLite tables with foreign-keyed sale items
//!
//! After each sale or cancellation a sync pass copies what the other store is
//! missing, merges what diverged and reports what it cannot safely decide.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cornershop::{SaleLine, Shop, ShopConfig};
//! use cornershop::core::Backend;
//!
//! async fn example() {
//!     let mut shop = Shop::open("shop-data", ShopConfig::default()).unwrap();
//!
//!     // Sell two pints of milk from the document store
//!     let receipt = shop.create_sale(&[SaleLine::new("Milk", 2)]).await.unwrap();
//!     println!("sold {} for {}", receipt.sale.id, receipt.sale.total);
//!
//!     // Read from the relational store instead
//!     shop.select_backend(Backend::Relational);
//!     println!("{}", shop.check_stock().await.unwrap());
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `cornershop::core` - Domain model (Product, Sale, SaleId, etc.)
//! - `cornershop::store` - Store adapters for both backends
//! - `cornershop::sync` - Reconciliation engine

pub mod error;
pub mod shop;
pub mod stock;

// Re-export component crates
pub use cornershop_core as core;
pub use cornershop_store as store;
pub use cornershop_sync as sync;

// Re-export main types for convenience
pub use error::{Result, ShopError};
pub use shop::{AutoSync, CancelReceipt, SaleLine, SaleReceipt, Shop, ShopConfig, StockAdjustment};
pub use stock::{CategoryStock, StockLine, StockReport, StockStatus, LOW_STOCK_THRESHOLD};

// Re-export commonly used types
pub use cornershop_core::{Backend, Decimal, Product, Sale, SaleId, SaleItem};
pub use cornershop_sync::{ConvergenceResult, SyncCancel, SyncConfig, SyncReport};
