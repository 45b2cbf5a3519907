//! Store trait: the uniform interface both backends expose.
//!
//! The reconciliation engine only needs the sync contract (full scans,
//! lookups by identity, idempotent upserts, conditional stock writes and the
//! cancelled flag). The shop operations below it are what the front end uses
//! to mutate the active store.

use async_trait::async_trait;
use cornershop_core::{Backend, Product, Sale, SaleDraft, SaleId};

use crate::error::Result;

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record with this identity existed.
    Inserted,
    /// An existing record was overwritten.
    Updated,
}

/// The Store trait: async, object-safe interface to one backend.
///
/// Implementations must be idempotent for `upsert_*`, `apply_stock_delta` must
/// be a single atomic relative update, and `record_sale`/`cancel_sale` must
/// change stock and the sale in one atomic step.
#[async_trait]
pub trait Store: Send + Sync {
    /// Which backend this is.
    fn backend(&self) -> Backend;

    // ─────────────────────────────────────────────────────────────────────────
    // Sync Contract: Products
    // ─────────────────────────────────────────────────────────────────────────

    /// Every product, in no particular order.
    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Look up a product by name, ignoring case.
    async fn get_product(&self, name: &str) -> Result<Option<Product>>;

    /// Insert or overwrite a product by name.
    async fn upsert_product(&self, product: &Product) -> Result<UpsertOutcome>;

    /// Atomically add `delta` to a product's stock.
    ///
    /// Fails with `NotFound` if the product does not exist and with
    /// `InsufficientStock` if the result would be negative.
    async fn apply_stock_delta(&self, name: &str, delta: i64) -> Result<()>;

    /// Overwrite a product's category and price, leaving its stock alone.
    ///
    /// Fails with `NotFound` if the product does not exist.
    async fn update_details(&self, product: &Product) -> Result<()>;

    /// Set a product's stock to `new` only if it currently holds `expected`.
    ///
    /// A stock that already equals `new` is left as is and counts as success,
    /// so repeating the call after a lost reply is harmless. Any other value
    /// fails with `Conflict`; a missing product fails with `NotFound`.
    async fn set_stock_if(&self, name: &str, expected: i64, new: i64) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Sync Contract: Sales
    // ─────────────────────────────────────────────────────────────────────────

    /// Every sale with its items, in no particular order.
    async fn list_sales(&self) -> Result<Vec<Sale>>;

    /// Look up a sale by id.
    async fn get_sale(&self, id: &SaleId) -> Result<Option<Sale>>;

    /// Insert or overwrite a sale and its items by id.
    async fn upsert_sale(&self, sale: &Sale) -> Result<UpsertOutcome>;

    /// Set a sale's cancelled flag. Fails with `NotFound` if absent.
    async fn set_cancelled(&self, id: &SaleId, cancelled: bool) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Shop Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Products whose name contains `term`, ignoring case.
    async fn search_products(&self, term: &str) -> Result<Vec<Product>>;

    /// Add a new product. Fails with `Conflict` if the name is taken.
    async fn create_product(&self, product: &Product) -> Result<()>;

    /// Record a sale: mint its id, take its items out of stock and store it,
    /// all or nothing.
    async fn record_sale(&self, draft: &SaleDraft) -> Result<Sale>;

    /// Cancel a sale and put its items back in stock, all or nothing.
    ///
    /// Returns `false` if the sale was already cancelled. Items whose product
    /// no longer exists are skipped.
    async fn cancel_sale(&self, id: &SaleId) -> Result<bool>;

    /// The `limit` most recent sales, newest first.
    async fn recent_sales(&self, limit: usize) -> Result<Vec<Sale>>;
}
