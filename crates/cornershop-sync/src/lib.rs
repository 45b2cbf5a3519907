//! # Corner Shop Sync
//!
//! Reconciliation engine that brings the document store and the relational
//! store back to the same catalogue and sales after they drift apart.
//!
//! ## Overview
//!
//! The shop writes to whichever store is active, so the other one falls
//! behind. A sync pass compares both stores entity by entity and repairs the
//! difference without a distributed transaction: idempotent upserts, stock
//! writes conditional on what the pass read and a monotonic cancelled flag,
//! re-run as often as needed.
//!
//! ## Key Properties
//!
//! - **Idempotent**: A second pass with no intervening writes changes nothing
//! - **Conservative**: Stock merges to the lower count, cancellation never reverts
//! - **Honest**: Sales whose items disagree are reported, never guessed at
//! - **Resumable**: A cancelled or failed pass is repaired by the next one
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cornershop_store::{DocumentStore, SqliteStore};
//! use cornershop_sync::{SyncConfig, SyncEngine};
//!
//! async fn example() {
//!     let document = Arc::new(DocumentStore::open("shop.json").unwrap());
//!     let relational = Arc::new(SqliteStore::open("shop.db").unwrap());
//!
//!     let engine = SyncEngine::new(document, relational, SyncConfig::default()).unwrap();
//!     let report = engine.sync_databases().await.unwrap();
//!     println!("{}", report);
//! }
//! ```
//!
//! ## Pipeline
//!
//! ```text
//!  list_all (both stores) ──> build_plan ──> execute ──> SyncReport
//!        products first, then sales
//! ```

pub mod cancel;
pub mod comparator;
pub mod config;
pub mod convergence;
pub mod entity;
pub mod error;
pub mod executor;
pub mod planner;
pub mod report;
pub mod retry;

use std::sync::Arc;

use cornershop_core::{Backend, Product, Sale};
use cornershop_store::Store;

pub use cancel::SyncCancel;
pub use comparator::{compare_products, compare_sales, Verdict};
pub use config::{DescriptiveSource, ProductMergePolicy, StockPolicy, SyncConfig};
pub use convergence::{store_digest, verify_convergence, ConvergenceResult, StateDigest};
pub use entity::SyncEntity;
pub use error::{Result, SyncError};
pub use executor::SyncExecutor;
pub use planner::{build_plan, SyncAction, SyncPlan};
pub use report::{
    ConflictClass, ConflictDescriptor, FailureDescriptor, KindOutcome, KindReport, SyncReport,
};
pub use retry::RetryPolicy;

use planner::PlanFailure;

/// Runs sync passes between one document store and one relational store.
pub struct SyncEngine {
    document: Arc<dyn Store>,
    relational: Arc<dyn Store>,
    config: SyncConfig,
    executor: SyncExecutor,
}

impl SyncEngine {
    /// Create an engine. Fails if the configuration is unusable or the
    /// stores are not one of each backend.
    pub fn new(
        document: Arc<dyn Store>,
        relational: Arc<dyn Store>,
        config: SyncConfig,
    ) -> Result<Self> {
        config.validate()?;
        if document.backend() != Backend::Document || relational.backend() != Backend::Relational {
            return Err(SyncError::Config(format!(
                "expected a document store and a relational store, got {} and {}",
                document.backend(),
                relational.backend()
            )));
        }

        let executor = SyncExecutor::new(document.clone(), relational.clone(), &config);
        Ok(Self {
            document,
            relational,
            config,
            executor,
        })
    }

    /// The engine's configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run one sync pass over every entity kind.
    pub async fn sync_databases(&self) -> Result<SyncReport> {
        self.sync_databases_with(&SyncCancel::new()).await
    }

    /// Run one sync pass that stops starting new actions once `cancel` is
    /// raised.
    ///
    /// Fails only when neither store can be reached. Everything else,
    /// including a kind that could not be read from one store, is in the
    /// report.
    pub async fn sync_databases_with(&self, cancel: &SyncCancel) -> Result<SyncReport> {
        tracing::info!(concurrent_kinds = self.config.run_kinds_concurrently, "sync pass started");
        let mut report = SyncReport::default();

        if self.config.run_kinds_concurrently {
            let (products, sales) = tokio::join!(
                self.sync_kind::<Product>(cancel),
                self.sync_kind::<Sale>(cancel)
            );
            report.absorb(products?);
            report.absorb(sales?);
        } else {
            report.absorb(self.sync_kind::<Product>(cancel).await?);
            report.absorb(self.sync_kind::<Sale>(cancel).await?);
        }

        report.cancelled = cancel.is_cancelled()
            && (report.products.skipped > 0 || report.sales.skipped > 0);

        tracing::info!(
            applied = report.applied(),
            conflicts = report.conflicts.len(),
            failures = report.failures.len(),
            cancelled = report.cancelled,
            "sync pass finished"
        );
        Ok(report)
    }

    async fn sync_kind<E: SyncEntity>(&self, cancel: &SyncCancel) -> Result<KindOutcome> {
        let retry = RetryPolicy::from_config(&self.config);
        let plan = planner::plan::<E>(
            self.document.as_ref(),
            self.relational.as_ref(),
            &retry,
            &self.config.product_merge_policy,
        )
        .await;

        match plan {
            Ok(plan) => Ok(self.executor.execute(plan, cancel).await),
            Err(PlanFailure::Fatal(e)) => {
                tracing::error!(kind = %E::KIND, error = %e, "both stores unreachable");
                Err(e)
            }
            Err(PlanFailure::Side(e)) => {
                tracing::warn!(kind = %E::KIND, error = %e, "could not read one store, kind skipped");
                let mut outcome = KindOutcome::new(E::KIND);
                outcome.failures.push(FailureDescriptor {
                    kind: E::KIND,
                    identity: None,
                    error: e.to_string(),
                });
                Ok(outcome)
            }
        }
    }
}
