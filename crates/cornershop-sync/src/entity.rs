//! The per-kind hooks the planner and executor are generic over.

use std::fmt::Debug;

use async_trait::async_trait;
use cornershop_core::{EntityKind, Product, Sale, SaleId};
use cornershop_store::{Result as StoreResult, Store, UpsertOutcome};

use crate::comparator::{compare_products, compare_sales, Verdict};
use crate::config::ProductMergePolicy;

/// An entity kind the engine can reconcile.
#[async_trait]
pub trait SyncEntity: Clone + Debug + PartialEq + Send + Sync + 'static {
    /// Which kind this is.
    const KIND: EntityKind;

    /// The cross-store identity key.
    fn identity(&self) -> String;

    /// Compare the document and relational copies.
    fn compare(document: &Self, relational: &Self, policy: &ProductMergePolicy) -> Verdict<Self>;

    /// Whether a store holding `current` must be written to hold `merged`.
    fn needs_write(current: &Self, merged: &Self) -> bool;

    /// Full scan of this kind.
    async fn list_all(store: &dyn Store) -> StoreResult<Vec<Self>>;

    /// Look up one entity by identity.
    async fn fetch(store: &dyn Store, identity: &str) -> StoreResult<Option<Self>>;

    /// Copy an entity into a store that does not have it.
    async fn upsert(store: &dyn Store, entity: &Self) -> StoreResult<UpsertOutcome>;

    /// Bring a store holding `current` to `merged` with the narrowest
    /// idempotent write available.
    async fn converge(store: &dyn Store, current: &Self, merged: &Self) -> StoreResult<()>;
}

#[async_trait]
impl SyncEntity for Product {
    const KIND: EntityKind = EntityKind::Product;

    fn identity(&self) -> String {
        self.key()
    }

    fn compare(document: &Self, relational: &Self, policy: &ProductMergePolicy) -> Verdict<Self> {
        compare_products(document, relational, policy)
    }

    fn needs_write(current: &Self, merged: &Self) -> bool {
        !current.same_details(merged) || current.stock_quantity != merged.stock_quantity
    }

    async fn list_all(store: &dyn Store) -> StoreResult<Vec<Self>> {
        store.list_products().await
    }

    async fn fetch(store: &dyn Store, identity: &str) -> StoreResult<Option<Self>> {
        store.get_product(identity).await
    }

    async fn upsert(store: &dyn Store, entity: &Self) -> StoreResult<UpsertOutcome> {
        store.upsert_product(entity).await
    }

    async fn converge(store: &dyn Store, current: &Self, merged: &Self) -> StoreResult<()> {
        if !current.same_details(merged) {
            store.update_details(merged).await?;
        }
        if current.stock_quantity != merged.stock_quantity {
            store
                .set_stock_if(&current.name, current.stock_quantity, merged.stock_quantity)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl SyncEntity for Sale {
    const KIND: EntityKind = EntityKind::Sale;

    fn identity(&self) -> String {
        self.id.to_string()
    }

    fn compare(document: &Self, relational: &Self, _policy: &ProductMergePolicy) -> Verdict<Self> {
        compare_sales(document, relational)
    }

    fn needs_write(current: &Self, merged: &Self) -> bool {
        current.is_cancelled != merged.is_cancelled
    }

    async fn list_all(store: &dyn Store) -> StoreResult<Vec<Self>> {
        store.list_sales().await
    }

    async fn fetch(store: &dyn Store, identity: &str) -> StoreResult<Option<Self>> {
        let id = SaleId::parse(identity)?;
        store.get_sale(&id).await
    }

    async fn upsert(store: &dyn Store, entity: &Self) -> StoreResult<UpsertOutcome> {
        store.upsert_sale(entity).await
    }

    async fn converge(store: &dyn Store, current: &Self, merged: &Self) -> StoreResult<()> {
        if current.is_cancelled != merged.is_cancelled {
            store.set_cancelled(&current.id, merged.is_cancelled).await?;
        }
        Ok(())
    }
}
