//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use chrono::Utc;
use cornershop_core::{Decimal, Product, Sale, SaleId, SaleItem};
use cornershop_store::{DocumentStore, SqliteStore, Store};

use crate::fault::FlakyStore;

/// Both stores, empty, each behind a fault injector.
pub struct StorePair {
    pub document: Arc<FlakyStore<DocumentStore>>,
    pub relational: Arc<FlakyStore<SqliteStore>>,
}

impl StorePair {
    /// An in-memory document store and an in-memory SQLite store.
    pub fn new() -> Self {
        let relational = SqliteStore::open_memory().expect("in-memory sqlite");
        Self {
            document: Arc::new(FlakyStore::new(DocumentStore::new())),
            relational: Arc::new(FlakyStore::new(relational)),
        }
    }

    /// The document store as a trait object.
    pub fn document_store(&self) -> Arc<dyn Store> {
        self.document.clone()
    }

    /// The relational store as a trait object.
    pub fn relational_store(&self) -> Arc<dyn Store> {
        self.relational.clone()
    }

    /// Write products to the document store only.
    pub async fn seed_document(&self, products: &[Product]) {
        seed_products(self.document.inner(), products).await;
    }

    /// Write products to the relational store only.
    pub async fn seed_relational(&self, products: &[Product]) {
        seed_products(self.relational.inner(), products).await;
    }

    /// Write the same products to both stores.
    pub async fn seed_both(&self, products: &[Product]) {
        self.seed_document(products).await;
        self.seed_relational(products).await;
    }

    /// Write a sale to the document store only.
    pub async fn seed_document_sale(&self, sale: &Sale) {
        self.document
            .inner()
            .upsert_sale(sale)
            .await
            .expect("seed document sale");
    }

    /// Write a sale to the relational store only.
    pub async fn seed_relational_sale(&self, sale: &Sale) {
        self.relational
            .inner()
            .upsert_sale(sale)
            .await
            .expect("seed relational sale");
    }

    /// Clear faults and counters on both stores.
    pub fn reset_faults(&self) {
        self.document.reset();
        self.relational.reset();
    }
}

impl Default for StorePair {
    fn default() -> Self {
        Self::new()
    }
}

async fn seed_products(store: &dyn Store, products: &[Product]) {
    for product in products {
        store.upsert_product(product).await.expect("seed product");
    }
}

/// A small catalogue spanning a few categories.
pub fn catalogue() -> Vec<Product> {
    vec![
        Product::new("Milk", "Dairy", Decimal::new(250, 2), 12),
        Product::new("Cheddar", "Dairy", Decimal::new(475, 2), 3),
        Product::new("Bread", "Bakery", Decimal::new(199, 2), 8),
        Product::new("Apples", "Produce", Decimal::new(35, 2), 40),
        Product::new("Soap", "Household", Decimal::new(120, 2), 0),
    ]
}

/// A sale dated now with a fresh id.
pub fn sale_of(items: &[(&str, i64, Decimal)]) -> Sale {
    let items = items
        .iter()
        .map(|(name, quantity, price)| SaleItem::new(*name, *quantity, *price))
        .collect();
    Sale::new(SaleId::generate(), Utc::now(), items)
}
