//! Configuration for the reconciliation engine.

use std::time::Duration;

use cornershop_core::Backend;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Which store supplies a product's category and price on divergence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptiveSource {
    #[default]
    PreferRelational,
    PreferDocument,
}

impl DescriptiveSource {
    /// The backend whose values win.
    pub fn backend(self) -> Backend {
        match self {
            DescriptiveSource::PreferRelational => Backend::Relational,
            DescriptiveSource::PreferDocument => Backend::Document,
        }
    }
}

/// How diverging stock levels merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockPolicy {
    /// Take the lower of the two counts.
    #[default]
    LowerStock,
    PreferRelational,
    PreferDocument,
}

impl StockPolicy {
    /// The merged stock level.
    pub fn merge(self, document: i64, relational: i64) -> i64 {
        match self {
            StockPolicy::LowerStock => document.min(relational),
            StockPolicy::PreferRelational => relational,
            StockPolicy::PreferDocument => document,
        }
    }
}

/// Field-level merge policy for products.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductMergePolicy {
    /// Source of category and price.
    #[serde(default)]
    pub descriptive: DescriptiveSource,
    /// Rule for stock quantity.
    #[serde(default)]
    pub stock: StockPolicy,
}

/// Reconciliation engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Product merge policy.
    pub product_merge_policy: ProductMergePolicy,
    /// Retries after the first attempt of a transiently failing call.
    pub retry_count: u32,
    /// Delay before the first retry; doubles for each further retry.
    pub retry_backoff: Duration,
    /// Timeout for a single adapter call. Expiry counts as `Unavailable`.
    pub call_timeout: Duration,
    /// Actions applied at once within one entity kind.
    pub max_concurrency: usize,
    /// Reconcile products and sales at the same time.
    pub run_kinds_concurrently: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            product_merge_policy: ProductMergePolicy::default(),
            retry_count: 3,
            retry_backoff: Duration::from_millis(50),
            call_timeout: Duration::from_secs(5),
            max_concurrency: 4,
            run_kinds_concurrently: false,
        }
    }
}

impl SyncConfig {
    /// Set the product merge policy.
    pub fn with_product_merge_policy(mut self, policy: ProductMergePolicy) -> Self {
        self.product_merge_policy = policy;
        self
    }

    /// Set the retry count.
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Set the initial retry backoff.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Set the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the worker pool size.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Reconcile entity kinds concurrently.
    pub fn with_kinds_concurrently(mut self, enabled: bool) -> Self {
        self.run_kinds_concurrently = enabled;
        self
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(SyncError::Config("max_concurrency must be at least 1".into()));
        }
        if self.call_timeout.is_zero() {
            return Err(SyncError::Config("call_timeout must be positive".into()));
        }
        Ok(())
    }

    /// Parse a JSON configuration. Missing fields take their defaults and
    /// durations are given in milliseconds.
    ///
    /// ```
    /// use cornershop_sync::SyncConfig;
    ///
    /// let config = SyncConfig::from_json(r#"{ "retry_count": 5, "call_timeout_ms": 250 }"#).unwrap();
    /// assert_eq!(config.retry_count, 5);
    /// assert_eq!(config.call_timeout.as_millis(), 250);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawConfig =
            serde_json::from_str(json).map_err(|e| SyncError::Config(e.to_string()))?;
        let config = SyncConfig::from(raw);
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    product_merge_policy: ProductMergePolicy,
    retry_count: u32,
    retry_backoff_ms: u64,
    call_timeout_ms: u64,
    max_concurrency: usize,
    run_kinds_concurrently: bool,
}

impl Default for RawConfig {
    fn default() -> Self {
        let defaults = SyncConfig::default();
        Self {
            product_merge_policy: defaults.product_merge_policy,
            retry_count: defaults.retry_count,
            retry_backoff_ms: defaults.retry_backoff.as_millis() as u64,
            call_timeout_ms: defaults.call_timeout.as_millis() as u64,
            max_concurrency: defaults.max_concurrency,
            run_kinds_concurrently: defaults.run_kinds_concurrently,
        }
    }
}

impl From<RawConfig> for SyncConfig {
    fn from(raw: RawConfig) -> Self {
        Self {
            product_merge_policy: raw.product_merge_policy,
            retry_count: raw.retry_count,
            retry_backoff: Duration::from_millis(raw.retry_backoff_ms),
            call_timeout: Duration::from_millis(raw.call_timeout_ms),
            max_concurrency: raw.max_concurrency,
            run_kinds_concurrently: raw.run_kinds_concurrently,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.product_merge_policy.stock, StockPolicy::LowerStock);
        assert_eq!(
            config.product_merge_policy.descriptive,
            DescriptiveSource::PreferRelational
        );
        assert_eq!(config.retry_count, 3);
        assert!(!config.run_kinds_concurrently);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stock_policy() {
        assert_eq!(StockPolicy::LowerStock.merge(5, 3), 3);
        assert_eq!(StockPolicy::PreferDocument.merge(5, 3), 5);
        assert_eq!(StockPolicy::PreferRelational.merge(5, 3), 3);
    }

    #[test]
    fn test_from_json() {
        let config = SyncConfig::from_json(
            r#"{
                "product_merge_policy": { "descriptive": "prefer_document", "stock": "prefer_relational" },
                "retry_backoff_ms": 10,
                "max_concurrency": 8
            }"#,
        )
        .unwrap();
        assert_eq!(config.product_merge_policy.descriptive, DescriptiveSource::PreferDocument);
        assert_eq!(config.product_merge_policy.stock, StockPolicy::PreferRelational);
        assert_eq!(config.retry_backoff, Duration::from_millis(10));
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.retry_count, 3);
    }

    #[test]
    fn test_from_json_rejects_bad_input() {
        assert!(matches!(
            SyncConfig::from_json(r#"{ "max_concurrency": 0 }"#),
            Err(SyncError::Config(_))
        ));
        assert!(matches!(
            SyncConfig::from_json(r#"{ "retries": 2 }"#),
            Err(SyncError::Config(_))
        ));
    }
}
