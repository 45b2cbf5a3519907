//! # Corner Shop Core
//!
//! Store-agnostic domain model for the corner shop: products, sales and the
//! items a sale owns.
//!
//! This crate contains no I/O and no storage. Both persistence backends (the
//! document store and the relational store) read and write these types, and
//! the reconciliation engine compares them.
//!
//! ## Key Types
//!
//! - [`Product`] - Identified by its case-insensitive name
//! - [`Sale`] - Identified by a [`SaleId`] minted once and shared by both stores
//! - [`SaleItem`] - Owned by exactly one sale, references a product by name
//! - [`SaleDraft`] - A sale that has not yet been recorded by a store
//! - [`EntityKind`] - The independently addressable kinds (products, sales)
//! - [`Backend`] - Which of the two stores a value came from
//!
//! ## Money
//!
//! Prices and totals are [`rust_decimal::Decimal`] values normalised to two
//! fractional digits with [`round_money`].

pub mod error;
pub mod product;
pub mod sale;
pub mod types;
pub mod validation;

pub use error::ValidationError;
pub use product::{product_key, Product};
pub use rust_decimal::Decimal;
pub use sale::{round_money, Sale, SaleDraft, SaleItem};
pub use types::{Backend, EntityKind, SaleId};
pub use validation::{validate_product, validate_sale, validate_sale_draft};
