//! # Corner Shop Testkit
//!
//! Testing utilities for the corner shop.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: A [`StorePair`] of empty in-memory stores and a seed catalogue
//! - **Fault injection**: [`FlakyStore`] wraps a store and fails, stalls or
//!   conflicts on demand
//! - **Generators**: Proptest strategies for products, sales and divergent catalogues
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use cornershop_testkit::{catalogue, StorePair};
//!
//! async fn example() {
//!     let pair = StorePair::new();
//!     pair.seed_relational(&catalogue()).await;
//!     pair.document.set_offline(true);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use cornershop_testkit::generators::divergent_catalogues;
//!
//! proptest! {
//!     #[test]
//!     fn reconciles(pair in divergent_catalogues(8)) {
//!         let (document, relational) = pair;
//!         // seed, sync, compare
//!     }
//! }
//! ```

pub mod fault;
pub mod fixtures;
pub mod generators;

pub use fault::FlakyStore;
pub use fixtures::{catalogue, sale_of, StorePair};
pub use generators::{divergent_catalogues, Drift};
