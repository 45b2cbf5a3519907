//! Cooperative cancellation of a sync pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared abort flag for a sync pass.
///
/// Cancelling stops the executor from starting further actions. Actions
/// already running finish; the report counts the rest as skipped and is
/// marked cancelled. Re-running the sync picks up where it stopped.
#[derive(Debug, Clone, Default)]
pub struct SyncCancel {
    flag: Arc<AtomicBool>,
}

impl SyncCancel {
    /// A flag that has not been raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let cancel = SyncCancel::new();
        let handle = cancel.clone();
        assert!(!cancel.is_cancelled());
        handle.cancel();
        assert!(cancel.is_cancelled());
    }
}
