//! The Shop: unified API for the corner shop.
//!
//! The shop talks to one active store at a time and leans on the sync
//! engine to bring the other store up to date after every mutation.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use cornershop_core::{product_key, Backend, Product, Sale, SaleDraft, SaleId, SaleItem};
use cornershop_store::{DocumentStore, SqliteStore, Store, StoreError};
use cornershop_sync::{ConvergenceResult, SyncCancel, SyncConfig, SyncEngine, SyncReport};

use crate::error::{Result, ShopError};
use crate::stock::StockReport;

/// File name of the document store inside a shop directory.
pub const DOCUMENT_FILE: &str = "shop.json";
/// File name of the relational store inside a shop directory.
pub const RELATIONAL_FILE: &str = "shop.db";

/// Configuration for the Shop.
#[derive(Debug, Clone)]
pub struct ShopConfig {
    /// Store used when the shop starts.
    pub initial_backend: Backend,
    /// Whether to run a sync pass after creating or cancelling a sale.
    pub sync_after_mutation: bool,
    /// Default number of sales returned by [`Shop::recent_sales`].
    pub recent_sales_limit: usize,
    /// Sync configuration.
    pub sync: SyncConfig,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            initial_backend: Backend::Document,
            sync_after_mutation: true,
            recent_sales_limit: 10,
            sync: SyncConfig::default(),
        }
    }
}

/// One requested line of a new sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleLine {
    pub product_name: String,
    pub quantity: i64,
}

impl SaleLine {
    pub fn new(product_name: impl Into<String>, quantity: i64) -> Self {
        Self {
            product_name: product_name.into(),
            quantity,
        }
    }
}

/// What happened to the sync pass that follows a mutation.
///
/// A failed pass never undoes the mutation; the next pass repairs it.
#[derive(Debug)]
pub enum AutoSync {
    /// `sync_after_mutation` is off.
    Disabled,
    /// Nothing changed, so no pass was run.
    NotNeeded,
    /// The pass ran; its report may still hold conflicts or failures.
    Completed(SyncReport),
    /// The pass could not run at all.
    Failed(String),
}

impl AutoSync {
    /// Whether the pass ran without conflicts, failures or skipped actions.
    pub fn is_settled(&self) -> bool {
        match self {
            AutoSync::Completed(report) => {
                report.conflicts.is_empty()
                    && report.failures.is_empty()
                    && !report.cancelled
            }
            _ => false,
        }
    }
}

/// Result of [`Shop::create_sale`].
#[derive(Debug)]
pub struct SaleReceipt {
    pub sale: Sale,
    pub sync: AutoSync,
}

/// Result of [`Shop::cancel_sale`].
#[derive(Debug)]
pub struct CancelReceipt {
    /// False if the sale was already cancelled.
    pub cancelled: bool,
    pub sync: AutoSync,
}

/// Result of [`Shop::adjust_stock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockAdjustment {
    /// The product as the active store now holds it.
    pub product: Product,
    /// Whether the same delta was applied to the other store.
    pub mirrored: bool,
}

/// The main Shop struct.
///
/// Provides a unified API for:
/// - Choosing the active store
/// - Searching and looking up products
/// - Creating and cancelling sales
/// - Checking stock levels
/// - Reconciling the two stores
pub struct Shop {
    document: Arc<dyn Store>,
    relational: Arc<dyn Store>,
    /// The store reads and writes go to.
    active: Backend,
    config: ShopConfig,
    engine: SyncEngine,
}

impl Shop {
    /// Create a shop over an existing pair of stores.
    pub fn new(
        document: Arc<dyn Store>,
        relational: Arc<dyn Store>,
        config: ShopConfig,
    ) -> Result<Self> {
        let engine = SyncEngine::new(document.clone(), relational.clone(), config.sync.clone())?;
        tracing::info!(active = %config.initial_backend, "shop opened");
        Ok(Self {
            document,
            relational,
            active: config.initial_backend,
            config,
            engine,
        })
    }

    /// Open (or create) both stores inside `dir`.
    pub fn open(dir: impl AsRef<Path>, config: ShopConfig) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(StoreError::from)?;

        let document = DocumentStore::open(dir.join(DOCUMENT_FILE))?;
        let relational = SqliteStore::open(dir.join(RELATIONAL_FILE))?;
        Self::new(Arc::new(document), Arc::new(relational), config)
    }

    /// Get the configuration.
    pub fn config(&self) -> &ShopConfig {
        &self.config
    }

    /// Get the document store.
    pub fn document_store(&self) -> &Arc<dyn Store> {
        &self.document
    }

    /// Get the relational store.
    pub fn relational_store(&self) -> &Arc<dyn Store> {
        &self.relational
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Store Selection
    // ─────────────────────────────────────────────────────────────────────────

    /// The store reads and writes currently go to.
    pub fn active_backend(&self) -> Backend {
        self.active
    }

    /// Switch reads and writes to `backend`.
    pub fn select_backend(&mut self, backend: Backend) {
        if self.active != backend {
            tracing::info!(from = %self.active, to = %backend, "switching active store");
            self.active = backend;
        }
    }

    fn active_store(&self) -> &dyn Store {
        self.store_for(self.active)
    }

    fn store_for(&self, backend: Backend) -> &dyn Store {
        match backend {
            Backend::Document => self.document.as_ref(),
            Backend::Relational => self.relational.as_ref(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Products
    // ─────────────────────────────────────────────────────────────────────────

    /// Products whose name contains `term`, ignoring case.
    pub async fn search_products(&self, term: &str) -> Result<Vec<Product>> {
        let term = term.trim();
        if term.is_empty() {
            return Err(ShopError::EmptySearchTerm);
        }
        let mut products = self.active_store().search_products(term).await?;
        products.sort_by_key(Product::key);
        Ok(products)
    }

    /// Look up one product by name, ignoring case.
    pub async fn product(&self, name: &str) -> Result<Product> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ShopError::EmptyProductName);
        }
        self.active_store()
            .get_product(name)
            .await?
            .ok_or_else(|| ShopError::ProductNotFound(name.to_string()))
    }

    /// Every product in the active store, sorted by name.
    pub async fn all_products(&self) -> Result<Vec<Product>> {
        let mut products = self.active_store().list_products().await?;
        products.sort_by_key(Product::key);
        Ok(products)
    }

    /// Add a new product to the active store, then sync.
    pub async fn create_product(&self, product: &Product) -> Result<AutoSync> {
        match self.active_store().create_product(product).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                return Err(ShopError::ProductExists(product.name.clone()))
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(product = %product.name, store = %self.active, "product created");
        Ok(self.auto_sync().await)
    }

    /// Add `delta` units (negative to remove) to a product.
    ///
    /// The delta goes to the active store and, when the other store holds the
    /// product, to that store too. A merge keeps the lower stock count, so a
    /// restock applied to one store alone would be undone by the next pass.
    pub async fn adjust_stock(&self, name: &str, delta: i64) -> Result<StockAdjustment> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ShopError::EmptyProductName);
        }
        if delta == 0 {
            return Err(ShopError::ZeroAdjustment(name.to_string()));
        }

        self.active_store()
            .apply_stock_delta(name, delta)
            .await
            .map_err(|e| stock_error(name, e))?;

        let other = self.store_for(self.active.other());
        let mirrored = match other.apply_stock_delta(name, delta).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(product = %name, store = %other.backend(), error = %e, "stock adjustment not mirrored");
                false
            }
        };

        let product = self.product(name).await?;
        tracing::info!(product = %product.name, delta, stock = product.stock_quantity, mirrored, "stock adjusted");
        Ok(StockAdjustment { product, mirrored })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Stock Check
    // ─────────────────────────────────────────────────────────────────────────

    /// Stock levels of every product, grouped by category.
    pub async fn check_stock(&self) -> Result<StockReport> {
        let products = self.active_store().list_products().await?;
        Ok(StockReport::from_products(products))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sales
    // ─────────────────────────────────────────────────────────────────────────

    /// Sell the requested lines from the active store, then sync.
    ///
    /// Lines naming the same product are combined. Each product must exist
    /// and have enough stock; the unit price and canonical name are taken
    /// from the store at the time of sale.
    pub async fn create_sale(&self, lines: &[SaleLine]) -> Result<SaleReceipt> {
        if lines.is_empty() {
            return Err(ShopError::EmptySale);
        }

        let mut order: Vec<String> = Vec::new();
        let mut quantities: HashMap<String, (String, i64)> = HashMap::new();
        for line in lines {
            let name = line.product_name.trim();
            if name.is_empty() {
                return Err(ShopError::EmptyProductName);
            }
            if line.quantity <= 0 {
                return Err(ShopError::InvalidQuantity {
                    name: name.to_string(),
                    quantity: line.quantity,
                });
            }
            let key = product_key(name);
            match quantities.get_mut(&key) {
                Some((_, quantity)) => *quantity += line.quantity,
                None => {
                    quantities.insert(key.clone(), (name.to_string(), line.quantity));
                    order.push(key);
                }
            }
        }

        let store = self.active_store();
        let mut items = Vec::with_capacity(order.len());
        for key in &order {
            let (name, quantity) = &quantities[key];
            let product = store
                .get_product(name)
                .await?
                .ok_or_else(|| ShopError::ProductNotFound(name.clone()))?;
            if product.stock_quantity < *quantity {
                return Err(ShopError::InsufficientStock {
                    name: product.name,
                    available: product.stock_quantity,
                    requested: *quantity,
                });
            }
            items.push(SaleItem::new(product.name, *quantity, product.price));
        }

        let sale = store
            .record_sale(&SaleDraft::new(items))
            .await
            .map_err(|e| match e {
                StoreError::InsufficientStock {
                    name,
                    available,
                    requested,
                } => ShopError::InsufficientStock {
                    name,
                    available,
                    requested,
                },
                other => other.into(),
            })?;
        tracing::info!(sale = %sale.id, total = %sale.total, store = %self.active, "sale created");

        let sync = self.auto_sync().await;
        Ok(SaleReceipt { sale, sync })
    }

    /// Cancel a sale and put its items back on the shelf, then sync.
    ///
    /// If the other store already holds the sale uncancelled it is cancelled
    /// there as well, so both stores restock before the pass compares them.
    pub async fn cancel_sale(&self, id: &SaleId) -> Result<CancelReceipt> {
        let cancelled = match self.active_store().cancel_sale(id).await {
            Ok(cancelled) => cancelled,
            Err(StoreError::NotFound(_)) => return Err(ShopError::SaleNotFound(id.clone())),
            Err(e) => return Err(e.into()),
        };
        if !cancelled {
            tracing::debug!(sale = %id, "sale already cancelled");
            return Ok(CancelReceipt {
                cancelled,
                sync: AutoSync::NotNeeded,
            });
        }
        tracing::info!(sale = %id, store = %self.active, "sale cancelled");

        let other = self.store_for(self.active.other());
        match other.get_sale(id).await {
            Ok(Some(sale)) if !sale.is_cancelled => {
                if let Err(e) = other.cancel_sale(id).await {
                    tracing::warn!(sale = %id, store = %other.backend(), error = %e, "cancellation not mirrored");
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(sale = %id, store = %other.backend(), error = %e, "cancellation not mirrored");
            }
        }

        let sync = self.auto_sync().await;
        Ok(CancelReceipt { cancelled, sync })
    }

    /// One sale from the active store, with its items.
    pub async fn sale(&self, id: &SaleId) -> Result<Sale> {
        self.active_store()
            .get_sale(id)
            .await?
            .ok_or_else(|| ShopError::SaleNotFound(id.clone()))
    }

    /// Newest sales first. `None` uses the configured default limit.
    pub async fn recent_sales(&self, limit: Option<usize>) -> Result<Vec<Sale>> {
        let limit = limit.unwrap_or(self.config.recent_sales_limit);
        Ok(self.active_store().recent_sales(limit).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Run one full sync pass.
    pub async fn sync_databases(&self) -> Result<SyncReport> {
        Ok(self.engine.sync_databases().await?)
    }

    /// Run one sync pass that can be cancelled.
    pub async fn sync_databases_with(&self, cancel: &SyncCancel) -> Result<SyncReport> {
        Ok(self.engine.sync_databases_with(cancel).await?)
    }

    /// Compare digests of both stores.
    pub async fn verify_convergence(&self) -> Result<ConvergenceResult> {
        Ok(cornershop_sync::verify_convergence(self.document.as_ref(), self.relational.as_ref()).await?)
    }

    async fn auto_sync(&self) -> AutoSync {
        if !self.config.sync_after_mutation {
            return AutoSync::Disabled;
        }
        match self.engine.sync_databases().await {
            Ok(report) => {
                if !report.conflicts.is_empty() || !report.failures.is_empty() {
                    tracing::warn!(%report, "automatic sync left work behind");
                }
                AutoSync::Completed(report)
            }
            Err(e) => {
                tracing::warn!(error = %e, "automatic sync failed");
                AutoSync::Failed(e.to_string())
            }
        }
    }
}

fn stock_error(name: &str, err: StoreError) -> ShopError {
    match err {
        StoreError::NotFound(_) => ShopError::ProductNotFound(name.to_string()),
        StoreError::InsufficientStock {
            name,
            available,
            requested,
        } => ShopError::InsufficientStock {
            name,
            available,
            requested,
        },
        other => other.into(),
    }
}
