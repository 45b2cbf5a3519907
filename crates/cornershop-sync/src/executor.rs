//! Plan execution.
//!
//! Actions run on a bounded worker pool. Every write is safe to repeat:
//! upserts by identity, detail updates that leave stock alone, stock writes
//! conditional on the snapshot value, and a boolean set of the cancelled
//! flag. A `Conflict`, `NotFound` or `InsufficientStock` from a store means
//! someone else changed the entity after the snapshot, so the executor
//! re-reads both copies, re-plans that one identity and applies the fresh
//! action once.

use std::sync::Arc;

use cornershop_core::{Backend, EntityKind};
use cornershop_store::{Store, StoreError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::cancel::SyncCancel;
use crate::config::{ProductMergePolicy, SyncConfig};
use crate::entity::SyncEntity;
use crate::error::SyncError;
use crate::planner::{replan_identity, SyncAction, SyncPlan};
use crate::report::{ConflictClass, ConflictDescriptor, FailureDescriptor, KindOutcome};
use crate::retry::RetryPolicy;

/// What happened to a single action.
#[derive(Debug)]
enum ActionResult {
    CopiedToDocument,
    CopiedToRelational,
    Merged,
    /// Recovery found the copies already agree.
    Unchanged,
    Conflict(ConflictDescriptor),
    Failed(FailureDescriptor),
}

/// Applies plans against both stores.
#[derive(Clone)]
pub struct SyncExecutor {
    document: Arc<dyn Store>,
    relational: Arc<dyn Store>,
    retry: RetryPolicy,
    policy: ProductMergePolicy,
    max_concurrency: usize,
}

impl SyncExecutor {
    /// Create an executor over the two stores.
    pub fn new(document: Arc<dyn Store>, relational: Arc<dyn Store>, config: &SyncConfig) -> Self {
        Self {
            document,
            relational,
            retry: RetryPolicy::from_config(config),
            policy: config.product_merge_policy,
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    fn store(&self, backend: Backend) -> &dyn Store {
        match backend {
            Backend::Document => self.document.as_ref(),
            Backend::Relational => self.relational.as_ref(),
        }
    }

    /// Apply every action in `plan`.
    ///
    /// Never fails as a whole: each action's result lands in the outcome.
    pub async fn execute<E: SyncEntity>(&self, plan: SyncPlan<E>, cancel: &SyncCancel) -> KindOutcome {
        let mut outcome = KindOutcome::new(E::KIND);
        outcome.report.unchanged = plan.unchanged;

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for action in plan.actions {
            if let SyncAction::FlagConflict { identity, reason } = action {
                tracing::warn!(kind = %E::KIND, %identity, %reason, "unresolvable divergence");
                record(
                    &mut outcome,
                    ActionResult::Conflict(ConflictDescriptor {
                        kind: E::KIND,
                        identity,
                        reason,
                        class: ConflictClass::Semantic,
                    }),
                );
                continue;
            }

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    outcome.report.skipped += 1;
                    continue;
                }
            };
            if cancel.is_cancelled() {
                outcome.report.skipped += 1;
                continue;
            }

            let executor = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                executor.apply(action).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => record(&mut outcome, result),
                Err(e) => record(
                    &mut outcome,
                    ActionResult::Failed(FailureDescriptor {
                        kind: E::KIND,
                        identity: None,
                        error: format!("action task failed: {}", e),
                    }),
                ),
            }
        }

        if outcome.report.skipped > 0 {
            tracing::info!(kind = %E::KIND, skipped = outcome.report.skipped, "sync cancelled, actions skipped");
        }
        outcome
    }

    async fn apply<E: SyncEntity>(&self, action: SyncAction<E>) -> ActionResult {
        let identity = action.identity();
        tracing::debug!(kind = %E::KIND, %identity, action = action.label(), "applying action");

        match self.apply_once(&action).await {
            Ok(result) => result,
            Err((_, e)) if e.is_concurrent_change() => self.recover::<E>(&identity, e).await,
            Err((backend, e)) => failed(E::KIND, &identity, SyncError::from_store(backend, e)),
        }
    }

    async fn apply_once<E: SyncEntity>(
        &self,
        action: &SyncAction<E>,
    ) -> Result<ActionResult, (Backend, StoreError)> {
        match action {
            SyncAction::CopyToRelational(entity) => {
                self.copy(Backend::Relational, entity).await?;
                Ok(ActionResult::CopiedToRelational)
            }
            SyncAction::CopyToDocument(entity) => {
                self.copy(Backend::Document, entity).await?;
                Ok(ActionResult::CopiedToDocument)
            }
            SyncAction::MergeAndApplyBoth {
                merged,
                document,
                relational,
            } => {
                if E::needs_write(document, merged) {
                    self.converge(Backend::Document, document, merged).await?;
                }
                if E::needs_write(relational, merged) {
                    self.converge(Backend::Relational, relational, merged).await?;
                }
                Ok(ActionResult::Merged)
            }
            SyncAction::FlagConflict { identity, reason } => {
                Ok(ActionResult::Conflict(ConflictDescriptor {
                    kind: E::KIND,
                    identity: identity.clone(),
                    reason: reason.clone(),
                    class: ConflictClass::Semantic,
                }))
            }
        }
    }

    async fn copy<E: SyncEntity>(&self, target: Backend, entity: &E) -> Result<(), (Backend, StoreError)> {
        let store = self.store(target);
        self.retry
            .call("upsert", || E::upsert(store, entity))
            .await
            .map(|_| ())
            .map_err(|e| (target, e))
    }

    async fn converge<E: SyncEntity>(
        &self,
        target: Backend,
        current: &E,
        merged: &E,
    ) -> Result<(), (Backend, StoreError)> {
        let store = self.store(target);
        self.retry
            .call("converge", || E::converge(store, current, merged))
            .await
            .map_err(|e| (target, e))
    }

    /// One recovery round after a concurrent change.
    async fn recover<E: SyncEntity>(&self, identity: &str, cause: StoreError) -> ActionResult {
        tracing::info!(kind = %E::KIND, identity, error = %cause, "concurrent change, re-planning");

        let action = match replan_identity::<E>(
            self.document.as_ref(),
            self.relational.as_ref(),
            identity,
            &self.retry,
            &self.policy,
        )
        .await
        {
            Ok(Some(action)) => action,
            Ok(None) => return ActionResult::Unchanged,
            Err(e) => return failed(E::KIND, identity, e),
        };

        match self.apply_once(&action).await {
            Ok(result) => result,
            Err((backend, e)) if e.is_concurrent_change() => {
                tracing::warn!(kind = %E::KIND, identity, %backend, error = %e, "concurrent change persisted");
                ActionResult::Conflict(ConflictDescriptor {
                    kind: E::KIND,
                    identity: identity.to_string(),
                    reason: format!("{} changed again during recovery: {}", backend, e),
                    class: ConflictClass::Data,
                })
            }
            Err((backend, e)) => failed(E::KIND, identity, SyncError::from_store(backend, e)),
        }
    }
}

fn failed(kind: EntityKind, identity: &str, error: SyncError) -> ActionResult {
    tracing::warn!(%kind, identity, %error, "sync action failed");
    ActionResult::Failed(FailureDescriptor {
        kind,
        identity: Some(identity.to_string()),
        error: error.to_string(),
    })
}

fn record(outcome: &mut KindOutcome, result: ActionResult) {
    let report = &mut outcome.report;
    match result {
        ActionResult::CopiedToDocument => report.copied_to_document += 1,
        ActionResult::CopiedToRelational => report.copied_to_relational += 1,
        ActionResult::Merged => report.merged += 1,
        ActionResult::Unchanged => report.unchanged += 1,
        ActionResult::Conflict(conflict) => {
            report.conflicted += 1;
            outcome.conflicts.push(conflict);
        }
        ActionResult::Failed(failure) => {
            report.failed += 1;
            outcome.failures.push(failure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::build_plan;
    use cornershop_core::{Decimal, EntityKind, Product};
    use cornershop_testkit::StorePair;
    use std::time::Duration;

    fn fast_config() -> SyncConfig {
        SyncConfig::default()
            .with_retry_backoff(Duration::from_millis(1))
            .with_call_timeout(Duration::from_secs(2))
    }

    fn milk(stock: i64) -> Product {
        Product::new("Milk", "Dairy", Decimal::new(250, 2), stock)
    }

    #[tokio::test]
    async fn test_merge_writes_only_the_divergent_side() {
        let pair = StorePair::new();
        pair.seed_document(&[milk(5)]).await;
        pair.seed_relational(&[milk(3)]).await;
        pair.reset_faults();

        let executor = SyncExecutor::new(pair.document_store(), pair.relational_store(), &fast_config());
        let plan = build_plan(vec![milk(5)], vec![milk(3)], &ProductMergePolicy::default());
        let outcome = executor.execute(plan, &SyncCancel::new()).await;

        assert_eq!(outcome.report.merged, 1);
        assert_eq!(pair.document.writes(), 1);
        assert_eq!(pair.relational.writes(), 0);
        assert_eq!(
            pair.document.inner().get_product("milk").await.unwrap().unwrap().stock_quantity,
            3
        );
    }

    #[tokio::test]
    async fn test_sale_after_snapshot_is_not_overwritten() {
        let pair = StorePair::new();
        pair.seed_document(&[milk(5)]).await;
        pair.seed_relational(&[milk(3)]).await;

        let executor = SyncExecutor::new(pair.document_store(), pair.relational_store(), &fast_config());
        let plan = build_plan(vec![milk(5)], vec![milk(3)], &ProductMergePolicy::default());

        // Three units sold from the document store after the snapshot.
        pair.document.inner().apply_stock_delta("milk", -3).await.unwrap();
        let outcome = executor.execute(plan, &SyncCancel::new()).await;

        assert_eq!(outcome.report.merged, 1);
        assert!(outcome.conflicts.is_empty());
        assert!(outcome.failures.is_empty());
        for store in [pair.document_store(), pair.relational_store()] {
            assert_eq!(store.get_product("milk").await.unwrap().unwrap().stock_quantity, 2);
        }
    }

    #[tokio::test]
    async fn test_reprice_keeps_sale_after_snapshot() {
        let pair = StorePair::new();
        let repriced = Product::new("Milk", "Dairy", Decimal::new(275, 2), 5);
        pair.seed_document(&[milk(5)]).await;
        pair.seed_relational(&[repriced.clone()]).await;

        let executor = SyncExecutor::new(pair.document_store(), pair.relational_store(), &fast_config());
        let plan = build_plan(vec![milk(5)], vec![repriced], &ProductMergePolicy::default());

        pair.document.inner().apply_stock_delta("milk", -1).await.unwrap();
        let outcome = executor.execute(plan, &SyncCancel::new()).await;

        assert_eq!(outcome.report.merged, 1);
        let stored = pair.document.inner().get_product("milk").await.unwrap().unwrap();
        assert_eq!(stored.price, Decimal::new(275, 2));
        assert_eq!(stored.stock_quantity, 4);
    }

    #[tokio::test]
    async fn test_conflict_recovered_once() {
        let pair = StorePair::new();
        pair.seed_document(&[milk(5)]).await;
        pair.relational.conflict_next_writes(1);

        let executor = SyncExecutor::new(pair.document_store(), pair.relational_store(), &fast_config());
        let plan: SyncPlan<Product> = build_plan(vec![milk(5)], vec![], &ProductMergePolicy::default());
        let outcome = executor.execute(plan, &SyncCancel::new()).await;

        assert_eq!(outcome.report.copied_to_relational, 1);
        assert!(outcome.conflicts.is_empty());
        assert_eq!(
            pair.relational.inner().get_product("Milk").await.unwrap(),
            Some(milk(5))
        );
    }

    #[tokio::test]
    async fn test_repeated_conflict_is_data_conflict() {
        let pair = StorePair::new();
        pair.seed_document(&[milk(5)]).await;
        pair.relational.conflict_next_writes(2);

        let executor = SyncExecutor::new(pair.document_store(), pair.relational_store(), &fast_config());
        let plan: SyncPlan<Product> = build_plan(vec![milk(5)], vec![], &ProductMergePolicy::default());
        let outcome = executor.execute(plan, &SyncCancel::new()).await;

        assert_eq!(outcome.report.conflicted, 1);
        assert_eq!(outcome.conflicts[0].class, ConflictClass::Data);
        assert_eq!(outcome.conflicts[0].kind, EntityKind::Product);
        assert!(matches!(outcome.conflicts[0].to_error(), SyncError::DataConflict { .. }));
    }

    #[tokio::test]
    async fn test_persistent_unavailability_is_failure() {
        let pair = StorePair::new();
        pair.relational.set_offline(true);

        let config = fast_config().with_retry_count(1);
        let executor = SyncExecutor::new(pair.document_store(), pair.relational_store(), &config);
        let plan: SyncPlan<Product> = build_plan(vec![milk(5)], vec![], &ProductMergePolicy::default());
        let outcome = executor.execute(plan, &SyncCancel::new()).await;

        assert_eq!(outcome.report.failed, 1);
        assert_eq!(outcome.failures[0].identity.as_deref(), Some("milk"));
        assert_eq!(pair.relational.calls(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_everything() {
        let pair = StorePair::new();
        let cancel = SyncCancel::new();
        cancel.cancel();

        let executor = SyncExecutor::new(pair.document_store(), pair.relational_store(), &fast_config());
        let plan: SyncPlan<Product> = build_plan(
            vec![milk(5), Product::new("Bread", "Bakery", Decimal::ONE, 2)],
            vec![],
            &ProductMergePolicy::default(),
        );
        let outcome = executor.execute(plan, &cancel).await;

        assert_eq!(outcome.report.skipped, 2);
        assert_eq!(outcome.report.applied(), 0);
        assert_eq!(pair.relational.calls(), 0);
    }
}
