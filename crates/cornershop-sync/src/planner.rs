//! Reconciliation planning.
//!
//! A plan is computed once per kind from snapshots of both stores taken at the
//! start of the pass. It is not re-validated against writes that land while
//! the pass runs; those are picked up by the next pass.

use std::collections::BTreeMap;

use cornershop_core::{Backend, EntityKind};
use cornershop_store::Store;

use crate::comparator::Verdict;
use crate::config::ProductMergePolicy;
use crate::entity::SyncEntity;
use crate::error::{Result, SyncError};
use crate::retry::RetryPolicy;

/// One per-identity step of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction<E> {
    /// Only the document store has it.
    CopyToRelational(E),
    /// Only the relational store has it.
    CopyToDocument(E),
    /// Both have it and their copies diverge.
    MergeAndApplyBoth {
        merged: E,
        document: E,
        relational: E,
    },
    /// Both have it and it cannot be merged. No writes.
    FlagConflict { identity: String, reason: String },
}

impl<E: SyncEntity> SyncAction<E> {
    /// Identity the action targets.
    pub fn identity(&self) -> String {
        match self {
            SyncAction::CopyToRelational(e) | SyncAction::CopyToDocument(e) => e.identity(),
            SyncAction::MergeAndApplyBoth { merged, .. } => merged.identity(),
            SyncAction::FlagConflict { identity, .. } => identity.clone(),
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            SyncAction::CopyToRelational(_) => "copy_to_relational",
            SyncAction::CopyToDocument(_) => "copy_to_document",
            SyncAction::MergeAndApplyBoth { .. } => "merge",
            SyncAction::FlagConflict { .. } => "conflict",
        }
    }
}

/// The actions needed to reconcile one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan<E> {
    pub kind: EntityKind,
    /// At most one action per identity, in identity order.
    pub actions: Vec<SyncAction<E>>,
    /// Identities already identical in both stores.
    pub unchanged: usize,
}

impl<E> SyncPlan<E> {
    /// Whether there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// The action for one identity given what each store holds, or `None` when
/// nothing needs doing.
pub fn plan_identity<E: SyncEntity>(
    document: Option<E>,
    relational: Option<E>,
    policy: &ProductMergePolicy,
) -> Option<SyncAction<E>> {
    match (document, relational) {
        (None, None) => None,
        (Some(document), None) => Some(SyncAction::CopyToRelational(document)),
        (None, Some(relational)) => Some(SyncAction::CopyToDocument(relational)),
        (Some(document), Some(relational)) => match E::compare(&document, &relational, policy) {
            Verdict::Identical => None,
            Verdict::Diverged(merged) => Some(SyncAction::MergeAndApplyBoth {
                merged,
                document,
                relational,
            }),
            Verdict::Incomparable(reason) => Some(SyncAction::FlagConflict {
                identity: document.identity(),
                reason,
            }),
        },
    }
}

/// Build a plan from two snapshots. Pure: no I/O.
///
/// Entities are keyed by identity; if a snapshot repeats an identity the last
/// occurrence wins.
pub fn build_plan<E: SyncEntity>(
    document: Vec<E>,
    relational: Vec<E>,
    policy: &ProductMergePolicy,
) -> SyncPlan<E> {
    let mut pairs: BTreeMap<String, (Option<E>, Option<E>)> = BTreeMap::new();
    for entity in document {
        let key = entity.identity();
        pairs.entry(key).or_default().0 = Some(entity);
    }
    for entity in relational {
        let key = entity.identity();
        pairs.entry(key).or_default().1 = Some(entity);
    }

    let mut plan = SyncPlan {
        kind: E::KIND,
        actions: Vec::new(),
        unchanged: 0,
    };
    for (_, (document, relational)) in pairs {
        match plan_identity(document, relational, policy) {
            Some(action) => plan.actions.push(action),
            None => plan.unchanged += 1,
        }
    }
    plan
}

/// Why a kind could not be planned.
#[derive(Debug)]
pub enum PlanFailure {
    /// One store could not be read; the kind is skipped for this pass.
    Side(SyncError),
    /// Neither store could be reached; the pass must stop.
    Fatal(SyncError),
}

/// Snapshot both stores (concurrently, with retries) and plan `E`.
pub async fn plan<E: SyncEntity>(
    document: &dyn Store,
    relational: &dyn Store,
    retry: &RetryPolicy,
    policy: &ProductMergePolicy,
) -> std::result::Result<SyncPlan<E>, PlanFailure> {
    let (document_snapshot, relational_snapshot) = tokio::join!(
        retry.call("list_all", || E::list_all(document)),
        retry.call("list_all", || E::list_all(relational)),
    );

    match (document_snapshot, relational_snapshot) {
        (Ok(document), Ok(relational)) => {
            let plan = build_plan(document, relational, policy);
            tracing::debug!(
                kind = %E::KIND,
                actions = plan.actions.len(),
                unchanged = plan.unchanged,
                "planned reconciliation"
            );
            Ok(plan)
        }
        (Err(d), Err(r)) if d.is_transient() && r.is_transient() => {
            Err(PlanFailure::Fatal(SyncError::FatalUnavailable {
                document: d.to_string(),
                relational: r.to_string(),
            }))
        }
        (Err(e), _) => Err(PlanFailure::Side(SyncError::from_store(Backend::Document, e))),
        (_, Err(e)) => Err(PlanFailure::Side(SyncError::from_store(Backend::Relational, e))),
    }
}

/// Re-read one identity from both stores and plan it afresh.
pub async fn replan_identity<E: SyncEntity>(
    document: &dyn Store,
    relational: &dyn Store,
    identity: &str,
    retry: &RetryPolicy,
    policy: &ProductMergePolicy,
) -> Result<Option<SyncAction<E>>> {
    let (document_copy, relational_copy) = tokio::join!(
        retry.call("fetch", || E::fetch(document, identity)),
        retry.call("fetch", || E::fetch(relational, identity)),
    );
    let document_copy = document_copy.map_err(|e| SyncError::from_store(Backend::Document, e))?;
    let relational_copy =
        relational_copy.map_err(|e| SyncError::from_store(Backend::Relational, e))?;
    Ok(plan_identity(document_copy, relational_copy, policy))
}
