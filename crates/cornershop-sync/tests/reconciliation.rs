//! End-to-end reconciliation between a document store and a SQLite store.

use std::time::Duration;

use cornershop_core::{Decimal, EntityKind, Product, Sale};
use cornershop_store::Store;
use cornershop_sync::{
    store_digest, verify_convergence, ConflictClass, ConvergenceResult, SyncCancel, SyncConfig,
    SyncEngine, SyncError,
};
use cornershop_testkit::{catalogue, sale_of, StorePair};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fast_config() -> SyncConfig {
    SyncConfig::default()
        .with_retry_backoff(Duration::from_millis(1))
        .with_call_timeout(Duration::from_secs(2))
}

fn engine(pair: &StorePair, config: SyncConfig) -> SyncEngine {
    SyncEngine::new(pair.document_store(), pair.relational_store(), config).unwrap()
}

fn milk(stock: i64) -> Product {
    Product::new("Milk", "Dairy", Decimal::new(250, 2), stock)
}

async fn stock(store: &dyn Store, name: &str) -> i64 {
    store.get_product(name).await.unwrap().unwrap().stock_quantity
}

#[tokio::test]
async fn test_second_pass_is_a_no_op() {
    init_tracing();
    let pair = StorePair::new();
    let products = catalogue();
    pair.seed_document(&products[..3]).await;
    pair.seed_relational(&products[2..]).await;
    pair.seed_document_sale(&sale_of(&[("Milk", 1, Decimal::new(250, 2))])).await;

    let engine = engine(&pair, fast_config());
    let first = engine.sync_databases().await.unwrap();
    assert!(first.applied() > 0);

    let second = engine.sync_databases().await.unwrap();
    assert_eq!(second.applied(), 0);
    assert!(second.conflicts.is_empty());
    assert!(second.is_clean());
    assert_eq!(second.products.unchanged, products.len());
    assert_eq!(second.sales.unchanged, 1);
}

#[tokio::test]
async fn test_lower_stock_wins_in_both_stores() {
    init_tracing();
    let pair = StorePair::new();
    pair.seed_document(&[milk(5)]).await;
    pair.seed_relational(&[milk(3)]).await;

    let report = engine(&pair, fast_config()).sync_databases().await.unwrap();

    assert_eq!(report.products.merged, 1);
    assert_eq!(stock(pair.document.inner(), "Milk").await, 3);
    assert_eq!(stock(pair.relational.inner(), "Milk").await, 3);
}

#[tokio::test]
async fn test_cancellation_is_monotonic() {
    init_tracing();
    let pair = StorePair::new();
    let sale = sale_of(&[("Milk", 2, Decimal::new(250, 2))]);
    pair.seed_document_sale(&sale.cancelled()).await;
    pair.seed_relational_sale(&sale).await;

    let engine = engine(&pair, fast_config());
    let report = engine.sync_databases().await.unwrap();
    assert_eq!(report.sales.merged, 1);

    for store in [pair.document_store(), pair.relational_store()] {
        assert!(store.get_sale(&sale.id).await.unwrap().unwrap().is_cancelled);
    }

    engine.sync_databases().await.unwrap();
    for store in [pair.document_store(), pair.relational_store()] {
        assert!(store.get_sale(&sale.id).await.unwrap().unwrap().is_cancelled);
    }
}

#[tokio::test]
async fn test_item_mismatch_is_reported_not_resolved() {
    init_tracing();
    let pair = StorePair::new();
    let document_sale = sale_of(&[("Milk", 2, Decimal::new(250, 2))]);
    let relational_sale = Sale {
        id: document_sale.id.clone(),
        ..sale_of(&[("Milk", 3, Decimal::new(250, 2))])
    };
    pair.seed_document_sale(&document_sale).await;
    pair.seed_relational_sale(&relational_sale).await;

    let report = engine(&pair, fast_config()).sync_databases().await.unwrap();

    assert_eq!(report.sales.conflicted, 1);
    assert_eq!(report.conflicts.len(), 1);
    let conflict = &report.conflicts[0];
    assert_eq!(conflict.kind, EntityKind::Sale);
    assert_eq!(conflict.identity, document_sale.id.to_string());
    assert_eq!(conflict.class, ConflictClass::Semantic);
    assert!(matches!(conflict.to_error(), SyncError::SemanticConflict { .. }));

    assert_eq!(pair.document.writes(), 0);
    assert_eq!(pair.relational.writes(), 0);
    assert_eq!(
        pair.document.inner().get_sale(&document_sale.id).await.unwrap(),
        Some(document_sale)
    );
    assert_eq!(
        pair.relational.inner().get_sale(&relational_sale.id).await.unwrap(),
        Some(relational_sale)
    );
}

#[tokio::test]
async fn test_missing_product_is_copied() {
    init_tracing();
    let pair = StorePair::new();
    let bread = Product::new("Bread", "Bakery", Decimal::new(199, 2), 10);
    pair.seed_document(&[bread.clone()]).await;

    let report = engine(&pair, fast_config()).sync_databases().await.unwrap();

    assert_eq!(report.products.copied_to_relational, 1);
    assert_eq!(pair.relational.inner().get_product("Bread").await.unwrap(), Some(bread));
}

#[tokio::test]
async fn test_sale_for_unknown_product_still_copies() {
    init_tracing();
    let pair = StorePair::new();
    let sale = sale_of(&[("Discontinued Tea", 1, Decimal::new(300, 2))]);
    pair.seed_relational_sale(&sale).await;

    let report = engine(&pair, fast_config()).sync_databases().await.unwrap();

    assert_eq!(report.sales.copied_to_document, 1);
    assert!(report.failures.is_empty());
    assert_eq!(pair.document.inner().get_sale(&sale.id).await.unwrap(), Some(sale));
}

#[tokio::test]
async fn test_single_transient_write_failure_still_applies() {
    init_tracing();
    let pair = StorePair::new();
    pair.seed_document(&[milk(4)]).await;
    pair.relational.fail_next_writes(1);

    let report = engine(&pair, fast_config()).sync_databases().await.unwrap();

    assert_eq!(report.products.copied_to_relational, 1);
    assert_eq!(report.products.failed, 0);
    assert!(report.failures.is_empty());
    assert_eq!(stock(pair.relational.inner(), "milk").await, 4);
}

#[tokio::test]
async fn test_stock_write_with_lost_reply_applies_once() {
    init_tracing();
    let pair = StorePair::new();
    pair.seed_document(&[milk(3)]).await;
    pair.seed_relational(&[milk(5)]).await;
    pair.relational
        .stall_after_next_writes(1, Duration::from_millis(500));

    let config = fast_config().with_call_timeout(Duration::from_millis(100));
    let engine = engine(&pair, config);

    let report = engine.sync_databases().await.unwrap();
    assert_eq!(report.products.merged, 1);
    assert_eq!(report.products.failed, 0);
    assert_eq!(stock(pair.document.inner(), "Milk").await, 3);
    assert_eq!(stock(pair.relational.inner(), "Milk").await, 3);

    let second = engine.sync_databases().await.unwrap();
    assert!(second.is_clean(), "{}", second);
    assert_eq!(stock(pair.relational.inner(), "Milk").await, 3);
}

#[tokio::test]
async fn test_exhausted_retries_are_failures() {
    init_tracing();
    let pair = StorePair::new();
    pair.seed_document(&[milk(4)]).await;
    pair.relational.fail_next_writes(10);

    let report = engine(&pair, fast_config().with_retry_count(2))
        .sync_databases()
        .await
        .unwrap();

    assert_eq!(report.products.failed, 1);
    assert_eq!(report.failures[0].identity.as_deref(), Some("milk"));
    assert!(pair.relational.inner().get_product("Milk").await.unwrap().is_none());
}

#[tokio::test]
async fn test_slow_store_times_out_and_fails() {
    init_tracing();
    let pair = StorePair::new();
    pair.seed_document(&[milk(4)]).await;

    let config = fast_config()
        .with_retry_count(0)
        .with_call_timeout(Duration::from_millis(100));
    let engine = engine(&pair, config);

    pair.relational.set_delay(Some(Duration::from_millis(400)));
    let report = engine.sync_databases().await.unwrap();

    // The relational snapshot times out, so neither kind can be planned.
    assert_eq!(report.failures.len(), 2);
    assert!(report.failures.iter().all(|f| f.identity.is_none()));
    assert!(report.failures[0].error.contains("timed out"));
}

#[tokio::test]
async fn test_both_stores_down_is_fatal() {
    init_tracing();
    let pair = StorePair::new();
    pair.document.set_offline(true);
    pair.relational.set_offline(true);

    let result = engine(&pair, fast_config().with_retry_count(1))
        .sync_databases()
        .await;
    assert!(matches!(result, Err(SyncError::FatalUnavailable { .. })));
}

#[tokio::test]
async fn test_one_store_down_fails_kinds_without_writes() {
    init_tracing();
    let pair = StorePair::new();
    pair.seed_relational(&catalogue()).await;
    pair.document.set_offline(true);

    let report = engine(&pair, fast_config().with_retry_count(1))
        .sync_databases()
        .await
        .unwrap();

    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.applied(), 0);
    assert_eq!(pair.relational.writes(), 0);
}

#[tokio::test]
async fn test_cancel_before_pass_touches_nothing() {
    init_tracing();
    let pair = StorePair::new();
    pair.seed_document(&catalogue()).await;

    let cancel = SyncCancel::new();
    cancel.cancel();
    let engine = engine(&pair, fast_config());
    let report = engine.sync_databases_with(&cancel).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.products.skipped, catalogue().len());
    assert_eq!(report.applied(), 0);
    assert!(pair.relational.inner().list_products().await.unwrap().is_empty());

    // Re-running the whole sync resumes safely.
    let report = engine.sync_databases().await.unwrap();
    assert!(!report.cancelled);
    assert_eq!(report.products.copied_to_relational, catalogue().len());
}

#[tokio::test]
async fn test_cancel_mid_pass_leaves_rest_untouched() {
    init_tracing();
    let pair = StorePair::new();
    pair.seed_document(&catalogue()).await;
    pair.relational.set_delay(Some(Duration::from_millis(100)));

    let engine = std::sync::Arc::new(engine(&pair, fast_config().with_max_concurrency(1)));
    let cancel = SyncCancel::new();
    let handle = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.sync_databases_with(&cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(150)).await;
    cancel.cancel();
    let report = handle.await.unwrap().unwrap();

    let applied = report.products.copied_to_relational;
    assert!(report.cancelled);
    assert!(report.products.skipped > 0);
    assert_eq!(applied + report.products.skipped, catalogue().len());
    assert_eq!(
        pair.relational.inner().list_products().await.unwrap().len(),
        applied
    );
}

#[tokio::test]
async fn test_kinds_concurrently() {
    init_tracing();
    let pair = StorePair::new();
    pair.seed_document(&catalogue()).await;
    pair.seed_relational_sale(&sale_of(&[("Apples", 6, Decimal::new(35, 2))])).await;

    let report = engine(&pair, fast_config().with_kinds_concurrently(true))
        .sync_databases()
        .await
        .unwrap();

    assert_eq!(report.products.copied_to_relational, catalogue().len());
    assert_eq!(report.sales.copied_to_document, 1);
    assert_eq!(
        verify_convergence(pair.document.inner(), pair.relational.inner())
            .await
            .unwrap(),
        ConvergenceResult::Converged
    );
}

#[tokio::test]
async fn test_digests_match_after_sync() {
    init_tracing();
    let pair = StorePair::new();
    let products = catalogue();
    pair.seed_document(&products).await;
    pair.seed_relational(&[milk(1)]).await;

    let before_document = store_digest(pair.document.inner(), EntityKind::Product).await.unwrap();
    let before_relational = store_digest(pair.relational.inner(), EntityKind::Product).await.unwrap();
    assert_ne!(before_document, before_relational);

    engine(&pair, fast_config()).sync_databases().await.unwrap();

    let result = verify_convergence(pair.document.inner(), pair.relational.inner())
        .await
        .unwrap();
    assert!(result.is_converged());
    assert_eq!(stock(pair.document.inner(), "milk").await, 1);
}

#[test]
fn test_engine_rejects_swapped_stores() {
    let pair = StorePair::new();
    let result = SyncEngine::new(pair.relational_store(), pair.document_store(), SyncConfig::default());
    assert!(matches!(result, Err(SyncError::Config(_))));

    let result = SyncEngine::new(
        pair.document_store(),
        pair.relational_store(),
        SyncConfig::default().with_max_concurrency(0),
    );
    assert!(matches!(result, Err(SyncError::Config(_))));
}
