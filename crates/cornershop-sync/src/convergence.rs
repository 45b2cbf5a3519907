//! Convergence verification.
//!
//! After a sync pass the two stores should hold the same comparable state.
//! Each store's state for one kind is reduced to a digest: the comparable
//! fields of every entity, sorted by identity, CBOR-encoded and hashed with
//! BLAKE3. Equal digests mean the stores agree.

use std::fmt;

use cornershop_core::{round_money, EntityKind, Product, Sale};
use cornershop_store::{Store, StoreError};
use serde::Serialize;

use crate::error::{Result, SyncError};

/// Domain separation prefix for store digests.
const DIGEST_DOMAIN: &[u8] = b"cornershop-digest-v1:";

/// BLAKE3 digest of one kind's comparable state in one store.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateDigest(pub [u8; 32]);

impl StateDigest {
    /// Hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for StateDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateDigest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for StateDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[derive(Serialize)]
struct ProductRecord {
    key: String,
    category: String,
    price: String,
    stock: i64,
}

impl From<&Product> for ProductRecord {
    fn from(p: &Product) -> Self {
        Self {
            key: p.key(),
            category: p.category.clone(),
            price: round_money(p.price).to_string(),
            stock: p.stock_quantity,
        }
    }
}

#[derive(Serialize)]
struct SaleRecord {
    id: String,
    items: Vec<(String, i64)>,
    cancelled: bool,
}

impl From<&Sale> for SaleRecord {
    fn from(s: &Sale) -> Self {
        Self {
            id: s.id.to_string(),
            items: s.item_signature(),
            cancelled: s.is_cancelled,
        }
    }
}

fn hash_records<R: Serialize>(kind: EntityKind, mut records: Vec<(String, R)>) -> std::result::Result<StateDigest, String> {
    records.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = blake3::Hasher::new();
    hasher.update(DIGEST_DOMAIN);
    hasher.update(kind.to_string().as_bytes());

    let mut buf = Vec::new();
    for (_, record) in &records {
        buf.clear();
        ciborium::into_writer(record, &mut buf).map_err(|e| e.to_string())?;
        hasher.update(&(buf.len() as u64).to_be_bytes());
        hasher.update(&buf);
    }

    Ok(StateDigest(*hasher.finalize().as_bytes()))
}

/// Compute the digest of `kind` in `store`.
pub async fn store_digest(store: &dyn Store, kind: EntityKind) -> Result<StateDigest> {
    let backend = store.backend();
    let to_sync = |e: StoreError| SyncError::from_store(backend, e);

    let hashed = match kind {
        EntityKind::Product => {
            let products = store.list_products().await.map_err(to_sync)?;
            hash_records(
                kind,
                products
                    .iter()
                    .map(|p| (p.key(), ProductRecord::from(p)))
                    .collect(),
            )
        }
        EntityKind::Sale => {
            let sales = store.list_sales().await.map_err(to_sync)?;
            hash_records(
                kind,
                sales
                    .iter()
                    .map(|s| (s.id.to_string(), SaleRecord::from(s)))
                    .collect(),
            )
        }
    };

    hashed.map_err(|e| SyncError::Store {
        backend,
        source: StoreError::InvalidData(format!("digest encoding: {}", e)),
    })
}

/// Result of convergence verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Both stores hold identical comparable state for every kind.
    Converged,
    /// The first kind whose digests differ.
    Diverged {
        kind: EntityKind,
        document: StateDigest,
        relational: StateDigest,
    },
}

impl ConvergenceResult {
    /// Check if the stores have converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }
}

/// Compare the digests of both stores for every kind.
pub async fn verify_convergence(
    document: &dyn Store,
    relational: &dyn Store,
) -> Result<ConvergenceResult> {
    for kind in EntityKind::ALL {
        let document_digest = store_digest(document, kind).await?;
        let relational_digest = store_digest(relational, kind).await?;
        if document_digest != relational_digest {
            tracing::debug!(%kind, document = %document_digest, relational = %relational_digest, "stores diverge");
            return Ok(ConvergenceResult::Diverged {
                kind,
                document: document_digest,
                relational: relational_digest,
            });
        }
    }
    Ok(ConvergenceResult::Converged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cornershop_core::Decimal;
    use cornershop_store::{DocumentStore, SqliteStore};
    use cornershop_testkit::{catalogue, sale_of};

    #[tokio::test]
    async fn test_digest_independent_of_backend_and_order() {
        let document = DocumentStore::new();
        let relational = SqliteStore::open_memory().unwrap();

        let products = catalogue();
        for p in &products {
            document.upsert_product(p).await.unwrap();
        }
        for p in products.iter().rev() {
            relational.upsert_product(p).await.unwrap();
        }

        let a = store_digest(&document, EntityKind::Product).await.unwrap();
        let b = store_digest(&relational, EntityKind::Product).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_hex().len(), 64);
    }

    #[tokio::test]
    async fn test_verify_detects_divergence() {
        let document = DocumentStore::new();
        let relational = DocumentStore::new();
        assert!(verify_convergence(&document, &relational).await.unwrap().is_converged());

        let sale = sale_of(&[("Milk", 1, Decimal::ONE)]);
        document.upsert_sale(&sale).await.unwrap();
        relational.upsert_sale(&sale.cancelled()).await.unwrap();

        match verify_convergence(&document, &relational).await.unwrap() {
            ConvergenceResult::Diverged { kind, .. } => assert_eq!(kind, EntityKind::Sale),
            other => panic!("expected divergence, got {:?}", other),
        }
    }
}
