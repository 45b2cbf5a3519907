//! The result of a sync pass.
//!
//! A report is displayed or logged; it is never stored as durable state.

use std::fmt;

use cornershop_core::EntityKind;
use serde::Serialize;

use crate::error::SyncError;

/// Counts for one entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindReport {
    /// Entities copied from the relational store into the document store.
    pub copied_to_document: usize,
    /// Entities copied from the document store into the relational store.
    pub copied_to_relational: usize,
    /// Entities present in both stores that were merged.
    pub merged: usize,
    /// Entities already identical in both stores.
    pub unchanged: usize,
    /// Entities left for manual resolution.
    pub conflicted: usize,
    /// Entities whose action failed.
    pub failed: usize,
    /// Actions not started because the pass was cancelled.
    pub skipped: usize,
}

impl KindReport {
    /// Actions that wrote to at least one store.
    pub fn applied(&self) -> usize {
        self.copied_to_document + self.copied_to_relational + self.merged
    }

    fn add(&mut self, other: &KindReport) {
        self.copied_to_document += other.copied_to_document;
        self.copied_to_relational += other.copied_to_relational;
        self.merged += other.merged;
        self.unchanged += other.unchanged;
        self.conflicted += other.conflicted;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

/// Whether a conflict came from the data itself or from a concurrent writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictClass {
    /// The comparator found a divergence no policy may resolve.
    Semantic,
    /// A concurrent change kept getting in the way of the write.
    Data,
}

/// A conflict left for operator review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictDescriptor {
    pub kind: EntityKind,
    pub identity: String,
    pub reason: String,
    pub class: ConflictClass,
}

impl ConflictDescriptor {
    /// The error this conflict corresponds to.
    pub fn to_error(&self) -> SyncError {
        match self.class {
            ConflictClass::Semantic => SyncError::SemanticConflict {
                kind: self.kind,
                identity: self.identity.clone(),
                reason: self.reason.clone(),
            },
            ConflictClass::Data => SyncError::DataConflict {
                kind: self.kind,
                identity: self.identity.clone(),
                reason: self.reason.clone(),
            },
        }
    }
}

/// An action (or a whole kind, when `identity` is `None`) that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDescriptor {
    pub kind: EntityKind,
    pub identity: Option<String>,
    pub error: String,
}

/// What one entity kind's reconciliation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindOutcome {
    pub kind: EntityKind,
    pub report: KindReport,
    pub conflicts: Vec<ConflictDescriptor>,
    pub failures: Vec<FailureDescriptor>,
}

impl KindOutcome {
    /// An empty outcome for `kind`.
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            report: KindReport::default(),
            conflicts: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Report of one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub products: KindReport,
    pub sales: KindReport,
    pub conflicts: Vec<ConflictDescriptor>,
    pub failures: Vec<FailureDescriptor>,
    /// The pass was cancelled before every action was started.
    pub cancelled: bool,
}

impl SyncReport {
    /// Counts for one kind.
    pub fn kind(&self, kind: EntityKind) -> &KindReport {
        match kind {
            EntityKind::Product => &self.products,
            EntityKind::Sale => &self.sales,
        }
    }

    fn kind_mut(&mut self, kind: EntityKind) -> &mut KindReport {
        match kind {
            EntityKind::Product => &mut self.products,
            EntityKind::Sale => &mut self.sales,
        }
    }

    /// Fold one kind's outcome into the report.
    pub fn absorb(&mut self, outcome: KindOutcome) {
        self.kind_mut(outcome.kind).add(&outcome.report);
        self.conflicts.extend(outcome.conflicts);
        self.failures.extend(outcome.failures);
    }

    /// Actions that wrote to at least one store, across kinds.
    pub fn applied(&self) -> usize {
        self.products.applied() + self.sales.applied()
    }

    /// No writes, conflicts, failures or skips: the stores already agreed.
    pub fn is_clean(&self) -> bool {
        self.applied() == 0
            && self.conflicts.is_empty()
            && self.failures.is_empty()
            && self.products.skipped + self.sales.skipped == 0
    }

    /// Conflicts of the given class.
    pub fn conflicts_of(&self, class: ConflictClass) -> impl Iterator<Item = &ConflictDescriptor> {
        self.conflicts.iter().filter(move |c| c.class == class)
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for kind in EntityKind::ALL {
            let r = self.kind(kind);
            writeln!(
                f,
                "{}s: {} copied to document, {} copied to relational, {} merged, {} unchanged, {} conflicted, {} failed, {} skipped",
                kind,
                r.copied_to_document,
                r.copied_to_relational,
                r.merged,
                r.unchanged,
                r.conflicted,
                r.failed,
                r.skipped
            )?;
        }
        for conflict in &self.conflicts {
            writeln!(
                f,
                "conflict ({:?}) {} {}: {}",
                conflict.class, conflict.kind, conflict.identity, conflict.reason
            )?;
        }
        for failure in &self.failures {
            match &failure.identity {
                Some(identity) => writeln!(f, "failed {} {}: {}", failure.kind, identity, failure.error)?,
                None => writeln!(f, "failed {}s: {}", failure.kind, failure.error)?,
            }
        }
        if self.cancelled {
            writeln!(f, "sync cancelled before completion")?;
        }
        Ok(())
    }
}
