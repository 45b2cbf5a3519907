//! Document-store implementation of the Store trait.
//!
//! Products and sales are kept as JSON documents in two collections, keyed by
//! lower-cased product name and by sale id. The store is in-memory unless it
//! is opened on a file, in which case every mutation rewrites the file
//! (write to a temporary sibling, then rename) before it becomes visible.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use cornershop_core::{
    product_key, validate_product, validate_sale, validate_sale_draft, Backend, Product, Sale,
    SaleDraft, SaleId,
};

use crate::error::{Result, StoreError};
use crate::traits::{Store, UpsertOutcome};

/// Document store backend.
///
/// Thread-safe via RwLock. Mutations run against a working copy that replaces
/// the live collections only once it has been persisted.
pub struct DocumentStore {
    collections: RwLock<Collections>,
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Collections {
    products: BTreeMap<String, Value>,
    sales: BTreeMap<String, Value>,
}

impl DocumentStore {
    /// Create an empty in-memory document store.
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(Collections::default()),
            path: None,
        }
    }

    /// Open a document store persisted at `path`.
    ///
    /// Loads the existing file if there is one.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let collections = if path.exists() {
            let bytes = fs::read(&path)?;
            serde_json::from_slice(&bytes)?
        } else {
            Collections::default()
        };
        tracing::debug!(path = %path.display(), "opened document store");
        Ok(Self {
            collections: RwLock::new(collections),
            path: Some(path),
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collections>> {
        self.collections
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }

    /// Apply `f` to a working copy, persist it, then publish it.
    fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Collections) -> Result<T>,
    {
        let mut guard = self
            .collections
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))?;

        let mut working = guard.clone();
        let out = f(&mut working)?;

        if let Some(path) = &self.path {
            persist(path, &working)?;
        }
        *guard = working;
        Ok(out)
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

fn persist(path: &Path, collections: &Collections) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(collections)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn decode_product(doc: &Value) -> Result<Product> {
    serde_json::from_value(doc.clone())
        .map_err(|e| StoreError::InvalidData(format!("product document: {}", e)))
}

fn decode_sale(doc: &Value) -> Result<Sale> {
    serde_json::from_value(doc.clone())
        .map_err(|e| StoreError::InvalidData(format!("sale document: {}", e)))
}

impl Collections {
    fn product(&self, key: &str) -> Result<Option<Product>> {
        self.products.get(key).map(decode_product).transpose()
    }

    fn put_product(&mut self, product: &Product) -> Result<bool> {
        let doc = serde_json::to_value(product)?;
        Ok(self.products.insert(product.key(), doc).is_some())
    }

    fn sale(&self, id: &SaleId) -> Result<Option<Sale>> {
        self.sales.get(id.as_str()).map(decode_sale).transpose()
    }

    fn put_sale(&mut self, sale: &Sale) -> Result<bool> {
        let doc = serde_json::to_value(sale)?;
        Ok(self.sales.insert(sale.id.to_string(), doc).is_some())
    }

    fn adjust_stock(&mut self, name: &str, delta: i64) -> Result<()> {
        let key = product_key(name);
        let product = self
            .product(&key)?
            .ok_or_else(|| StoreError::NotFound(format!("product {}", name)))?;

        let updated = product.stock_quantity + delta;
        if updated < 0 {
            return Err(StoreError::InsufficientStock {
                name: product.name,
                available: product.stock_quantity,
                requested: -delta,
            });
        }
        self.put_product(&product.with_stock(updated))?;
        Ok(())
    }
}

#[async_trait]
impl Store for DocumentStore {
    fn backend(&self) -> Backend {
        Backend::Document
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let collections = self.read()?;
        collections.products.values().map(decode_product).collect()
    }

    async fn get_product(&self, name: &str) -> Result<Option<Product>> {
        self.read()?.product(&product_key(name))
    }

    async fn upsert_product(&self, product: &Product) -> Result<UpsertOutcome> {
        validate_product(product)?;
        let existed = self.mutate(|c| c.put_product(product))?;
        tracing::debug!(product = %product.name, existed, "document store upserted product");
        Ok(if existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    async fn apply_stock_delta(&self, name: &str, delta: i64) -> Result<()> {
        self.mutate(|c| c.adjust_stock(name, delta))
    }

    async fn update_details(&self, product: &Product) -> Result<()> {
        validate_product(product)?;
        self.mutate(|c| {
            let mut stored = c
                .product(&product.key())?
                .ok_or_else(|| StoreError::NotFound(format!("product {}", product.name)))?;
            stored.category = product.category.clone();
            stored.price = product.price;
            c.put_product(&stored)?;
            Ok(())
        })
    }

    async fn set_stock_if(&self, name: &str, expected: i64, new: i64) -> Result<()> {
        if new < 0 {
            return Err(StoreError::InvalidData(format!(
                "stock of {} cannot be negative: {}",
                name, new
            )));
        }
        self.mutate(|c| {
            let stored = c
                .product(&product_key(name))?
                .ok_or_else(|| StoreError::NotFound(format!("product {}", name)))?;
            match stored.stock_quantity {
                current if current == new => Ok(()),
                current if current == expected => {
                    c.put_product(&stored.with_stock(new))?;
                    Ok(())
                }
                current => Err(StoreError::Conflict(format!(
                    "stock of {} is {}, expected {}",
                    name, current, expected
                ))),
            }
        })
    }

    async fn list_sales(&self) -> Result<Vec<Sale>> {
        let collections = self.read()?;
        collections.sales.values().map(decode_sale).collect()
    }

    async fn get_sale(&self, id: &SaleId) -> Result<Option<Sale>> {
        self.read()?.sale(id)
    }

    async fn upsert_sale(&self, sale: &Sale) -> Result<UpsertOutcome> {
        validate_sale(sale)?;
        let existed = self.mutate(|c| c.put_sale(sale))?;
        tracing::debug!(sale = %sale.id, existed, "document store upserted sale");
        Ok(if existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    async fn set_cancelled(&self, id: &SaleId, cancelled: bool) -> Result<()> {
        self.mutate(|c| {
            let mut sale = c
                .sale(id)?
                .ok_or_else(|| StoreError::NotFound(format!("sale {}", id)))?;
            sale.is_cancelled = cancelled;
            c.put_sale(&sale)?;
            Ok(())
        })
    }

    async fn search_products(&self, term: &str) -> Result<Vec<Product>> {
        let needle = term.to_lowercase();
        let collections = self.read()?;
        let mut found = Vec::new();
        for (key, doc) in &collections.products {
            if key.contains(&needle) {
                found.push(decode_product(doc)?);
            }
        }
        Ok(found)
    }

    async fn create_product(&self, product: &Product) -> Result<()> {
        validate_product(product)?;
        self.mutate(|c| {
            if c.products.contains_key(&product.key()) {
                return Err(StoreError::Conflict(format!(
                    "product {} already exists",
                    product.name
                )));
            }
            c.put_product(product)?;
            Ok(())
        })
    }

    async fn record_sale(&self, draft: &SaleDraft) -> Result<Sale> {
        validate_sale_draft(draft)?;
        let sale = draft.clone().into_sale(SaleId::generate());

        self.mutate(|c| {
            for item in &sale.items {
                c.adjust_stock(&item.product_name, -item.quantity)?;
            }
            if c.sales.contains_key(sale.id.as_str()) {
                return Err(StoreError::Conflict(format!("sale {} already exists", sale.id)));
            }
            c.put_sale(&sale)?;
            Ok(())
        })?;

        tracing::info!(sale = %sale.id, total = %sale.total, "document store recorded sale");
        Ok(sale)
    }

    async fn cancel_sale(&self, id: &SaleId) -> Result<bool> {
        self.mutate(|c| {
            let sale = c
                .sale(id)?
                .ok_or_else(|| StoreError::NotFound(format!("sale {}", id)))?;
            if sale.is_cancelled {
                return Ok(false);
            }
            for item in &sale.items {
                match c.adjust_stock(&item.product_name, item.quantity) {
                    Ok(()) => {}
                    Err(StoreError::NotFound(_)) => {
                        tracing::warn!(product = %item.product_name, sale = %id, "cannot restock missing product");
                    }
                    Err(e) => return Err(e),
                }
            }
            c.put_sale(&sale.cancelled())?;
            Ok(true)
        })
    }

    async fn recent_sales(&self, limit: usize) -> Result<Vec<Sale>> {
        let mut sales = self.list_sales().await?;
        sales.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
        sales.truncate(limit);
        Ok(sales)
    }
}
