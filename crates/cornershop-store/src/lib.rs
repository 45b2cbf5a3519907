//! # Corner Shop Store
//!
//! Storage backends for the corner shop behind one async [`Store`] trait.
//!
//! ## Overview
//!
//! The shop keeps the same catalogue and sales in two independent stores:
//! a document store ([`DocumentStore`], JSON documents keyed by identity) and
//! a relational store ([`SqliteStore`], normalised SQLite tables). Either can
//! be the active store the front end writes to. The reconciliation engine
//! talks to both through the same trait and never sees a concrete type.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`DocumentStore`] - In-memory document collections, optionally persisted to a JSON file
//! - [`SqliteStore`] - SQLite-based relational storage
//! - [`UpsertOutcome`] - Whether an upsert inserted or overwrote
//! - [`StoreError`] - Errors, with [`StoreError::is_transient`] for the retry layer
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cornershop_core::{Decimal, Product};
//! use cornershop_store::{DocumentStore, SqliteStore, Store};
//!
//! async fn example() {
//!     let relational = SqliteStore::open("shop.db").unwrap();
//!     let document = DocumentStore::open("shop.json").unwrap();
//!
//!     let milk = Product::new("Milk", "Dairy", Decimal::new(250, 2), 12);
//!     relational.upsert_product(&milk).await.unwrap();
//!     document.upsert_product(&milk).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent upserts**: Writing the same value twice leaves one record
//! - **Relative stock**: `apply_stock_delta` is a single atomic update, never read-modify-write
//! - **Conditional stock**: `set_stock_if` writes only over the value the caller read
//! - **Atomic shop writes**: Recording or cancelling a sale changes stock and the sale together

pub mod document;
pub mod error;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use document::DocumentStore;
pub use error::{Result, StoreError};
pub use sqlite::SqliteStore;
pub use traits::{Store, UpsertOutcome};
