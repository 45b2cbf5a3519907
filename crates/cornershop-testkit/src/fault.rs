//! Fault injection for store adapters.
//!
//! [`FlakyStore`] wraps any [`Store`] and can make calls fail, stall or
//! report conflicts on demand, so retry, timeout and recovery paths can be
//! driven deterministically from a test.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use cornershop_core::{Backend, Product, Sale, SaleDraft, SaleId};
use cornershop_store::{Result, Store, StoreError, UpsertOutcome};

#[derive(Debug, Default)]
struct Faults {
    offline: bool,
    fail_next: usize,
    fail_next_writes: usize,
    conflict_next_writes: usize,
    delay: Option<Duration>,
    stall_after_writes: usize,
    stall: Duration,
}

/// A store wrapper with injectable faults.
pub struct FlakyStore<S> {
    inner: S,
    faults: Mutex<Faults>,
    calls: AtomicUsize,
    writes: AtomicUsize,
}

impl<S: Store> FlakyStore<S> {
    /// Wrap a store with no faults armed.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            faults: Mutex::new(Faults::default()),
            calls: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// The wrapped store, bypassing fault injection.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Make every call fail with `Unavailable` until brought back online.
    pub fn set_offline(&self, offline: bool) {
        self.faults().offline = offline;
    }

    /// Make the next `n` calls fail with `Unavailable`.
    pub fn fail_next(&self, n: usize) {
        self.faults().fail_next = n;
    }

    /// Make the next `n` write calls fail with `Unavailable`.
    pub fn fail_next_writes(&self, n: usize) {
        self.faults().fail_next_writes = n;
    }

    /// Make the next `n` write calls fail with `Conflict`.
    pub fn conflict_next_writes(&self, n: usize) {
        self.faults().conflict_next_writes = n;
    }

    /// Let the next `n` writes land, then hold each reply back for `stall`.
    ///
    /// With a call timeout shorter than `stall` the caller sees a timeout for
    /// a write that has already been applied.
    pub fn stall_after_next_writes(&self, n: usize, stall: Duration) {
        let mut faults = self.faults();
        faults.stall_after_writes = n;
        faults.stall = stall;
    }

    /// Stall every call for `delay` before running it.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.faults().delay = delay;
    }

    /// Calls received so far, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Write calls that reached the wrapped store.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Clear all armed faults and counters.
    pub fn reset(&self) {
        *self.faults() = Faults::default();
        self.calls.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn gate(&self, write: bool) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let (delay, outcome) = {
            let mut faults = self.faults();
            let outcome = if faults.offline {
                Err(StoreError::Unavailable(format!(
                    "{} offline",
                    self.inner.backend()
                )))
            } else if faults.fail_next > 0 {
                faults.fail_next -= 1;
                Err(StoreError::Unavailable(format!(
                    "{} injected failure",
                    self.inner.backend()
                )))
            } else if write && faults.fail_next_writes > 0 {
                faults.fail_next_writes -= 1;
                Err(StoreError::Unavailable(format!(
                    "{} injected write failure",
                    self.inner.backend()
                )))
            } else if write && faults.conflict_next_writes > 0 {
                faults.conflict_next_writes -= 1;
                Err(StoreError::Conflict(format!(
                    "{} injected concurrent change",
                    self.inner.backend()
                )))
            } else {
                Ok(())
            };
            (faults.delay, outcome)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if outcome.is_ok() && write {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        outcome
    }

    async fn settle<T>(&self, result: Result<T>) -> Result<T> {
        let stall = {
            let mut faults = self.faults();
            if faults.stall_after_writes > 0 {
                faults.stall_after_writes -= 1;
                Some(faults.stall)
            } else {
                None
            }
        };
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
        result
    }
}

#[async_trait]
impl<S: Store> Store for FlakyStore<S> {
    fn backend(&self) -> Backend {
        self.inner.backend()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        self.gate(false).await?;
        self.inner.list_products().await
    }

    async fn get_product(&self, name: &str) -> Result<Option<Product>> {
        self.gate(false).await?;
        self.inner.get_product(name).await
    }

    async fn upsert_product(&self, product: &Product) -> Result<UpsertOutcome> {
        self.gate(true).await?;
        self.settle(self.inner.upsert_product(product).await).await
    }

    async fn apply_stock_delta(&self, name: &str, delta: i64) -> Result<()> {
        self.gate(true).await?;
        self.settle(self.inner.apply_stock_delta(name, delta).await).await
    }

    async fn update_details(&self, product: &Product) -> Result<()> {
        self.gate(true).await?;
        self.settle(self.inner.update_details(product).await).await
    }

    async fn set_stock_if(&self, name: &str, expected: i64, new: i64) -> Result<()> {
        self.gate(true).await?;
        self.settle(self.inner.set_stock_if(name, expected, new).await).await
    }

    async fn list_sales(&self) -> Result<Vec<Sale>> {
        self.gate(false).await?;
        self.inner.list_sales().await
    }

    async fn get_sale(&self, id: &SaleId) -> Result<Option<Sale>> {
        self.gate(false).await?;
        self.inner.get_sale(id).await
    }

    async fn upsert_sale(&self, sale: &Sale) -> Result<UpsertOutcome> {
        self.gate(true).await?;
        self.settle(self.inner.upsert_sale(sale).await).await
    }

    async fn set_cancelled(&self, id: &SaleId, cancelled: bool) -> Result<()> {
        self.gate(true).await?;
        self.settle(self.inner.set_cancelled(id, cancelled).await).await
    }

    async fn search_products(&self, term: &str) -> Result<Vec<Product>> {
        self.gate(false).await?;
        self.inner.search_products(term).await
    }

    async fn create_product(&self, product: &Product) -> Result<()> {
        self.gate(true).await?;
        self.settle(self.inner.create_product(product).await).await
    }

    async fn record_sale(&self, draft: &SaleDraft) -> Result<Sale> {
        self.gate(true).await?;
        self.settle(self.inner.record_sale(draft).await).await
    }

    async fn cancel_sale(&self, id: &SaleId) -> Result<bool> {
        self.gate(true).await?;
        self.settle(self.inner.cancel_sale(id).await).await
    }

    async fn recent_sales(&self, limit: usize) -> Result<Vec<Sale>> {
        self.gate(false).await?;
        self.inner.recent_sales(limit).await
    }
}
