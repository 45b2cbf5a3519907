//! Entity comparison and merging.
//!
//! There are no per-field timestamps in the model, so last-writer-wins is not
//! available. Merges are deterministic and conservative instead:
//!
//! - Product stock follows [`StockPolicy`](crate::config::StockPolicy) (lower count by default)
//! - Product category and price follow [`DescriptiveSource`](crate::config::DescriptiveSource) (relational by default)
//! - A sale is cancelled if either store says so
//! - Sales whose items differ are never merged

use cornershop_core::{Backend, Product, Sale};

use crate::config::ProductMergePolicy;

/// Outcome of comparing the two copies of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict<E> {
    /// Comparable fields agree.
    Identical,
    /// Comparable fields differ; the merged value both stores should hold.
    Diverged(E),
    /// The copies disagree in a way no policy may resolve.
    Incomparable(String),
}

/// Compare a product's document and relational copies.
pub fn compare_products(
    document: &Product,
    relational: &Product,
    policy: &ProductMergePolicy,
) -> Verdict<Product> {
    if document.same_details(relational) && document.stock_quantity == relational.stock_quantity {
        return Verdict::Identical;
    }

    let base = match policy.descriptive.backend() {
        Backend::Relational => relational,
        Backend::Document => document,
    };
    let stock = policy
        .stock
        .merge(document.stock_quantity, relational.stock_quantity);

    Verdict::Diverged(base.with_stock(stock))
}

/// Compare a sale's document and relational copies.
pub fn compare_sales(document: &Sale, relational: &Sale) -> Verdict<Sale> {
    let document_items = document.item_signature();
    let relational_items = relational.item_signature();
    if document_items != relational_items {
        return Verdict::Incomparable(format!(
            "items differ: document {} vs relational {}",
            describe_items(&document_items),
            describe_items(&relational_items)
        ));
    }

    if document.is_cancelled == relational.is_cancelled {
        return Verdict::Identical;
    }

    Verdict::Diverged(Sale {
        is_cancelled: true,
        ..relational.clone()
    })
}

fn describe_items(items: &[(String, i64)]) -> String {
    let parts: Vec<String> = items
        .iter()
        .map(|(name, quantity)| format!("{} x{}", name, quantity))
        .collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DescriptiveSource, StockPolicy};
    use cornershop_core::Decimal;
    use cornershop_testkit::sale_of;

    fn default_policy() -> ProductMergePolicy {
        ProductMergePolicy::default()
    }

    fn product(category: &str, cents: i64, stock: i64) -> Product {
        Product::new("Milk", category, Decimal::new(cents, 2), stock)
    }

    #[test]
    fn test_identical_products() {
        let a = product("Dairy", 250, 5);
        let b = Product::new("MILK", "Dairy", Decimal::new(25, 1), 5);
        assert_eq!(compare_products(&a, &b, &default_policy()), Verdict::Identical);
    }

    #[test]
    fn test_lower_stock_wins() {
        let document = product("Dairy", 250, 5);
        let relational = product("Dairy", 250, 3);
        assert_eq!(
            compare_products(&document, &relational, &default_policy()),
            Verdict::Diverged(product("Dairy", 250, 3))
        );
        assert_eq!(
            compare_products(&relational, &document, &default_policy()),
            Verdict::Diverged(product("Dairy", 250, 3))
        );
    }

    #[test]
    fn test_descriptive_fields_from_relational() {
        let document = product("Drinks", 199, 2);
        let relational = product("Dairy", 250, 7);
        assert_eq!(
            compare_products(&document, &relational, &default_policy()),
            Verdict::Diverged(product("Dairy", 250, 2))
        );
    }

    #[test]
    fn test_configured_policy() {
        let policy = ProductMergePolicy {
            descriptive: DescriptiveSource::PreferDocument,
            stock: StockPolicy::PreferRelational,
        };
        let document = product("Drinks", 199, 2);
        let relational = product("Dairy", 250, 7);
        assert_eq!(
            compare_products(&document, &relational, &policy),
            Verdict::Diverged(product("Drinks", 199, 7))
        );
    }

    fn sale(items: &[(&str, i64)]) -> Sale {
        let items: Vec<_> = items
            .iter()
            .map(|(name, qty)| (*name, *qty, Decimal::ONE))
            .collect();
        sale_of(&items)
    }

    fn same_id(sale: &Sale, other: Sale) -> Sale {
        Sale {
            id: sale.id.clone(),
            ..other
        }
    }

    #[test]
    fn test_cancelled_is_ored() {
        let open = sale(&[("Milk", 2)]);
        let cancelled = open.cancelled();

        match compare_sales(&cancelled, &open) {
            Verdict::Diverged(merged) => assert!(merged.is_cancelled),
            other => panic!("expected divergence, got {:?}", other),
        }
        match compare_sales(&open, &cancelled) {
            Verdict::Diverged(merged) => assert!(merged.is_cancelled),
            other => panic!("expected divergence, got {:?}", other),
        }
        assert_eq!(compare_sales(&cancelled, &cancelled), Verdict::Identical);
    }

    #[test]
    fn test_item_order_and_case_ignored() {
        let a = sale(&[("Milk", 2), ("Bread", 1)]);
        let b = same_id(&a, sale(&[("bread", 1), ("MILK", 2)]));
        assert_eq!(compare_sales(&a, &b), Verdict::Identical);
    }

    #[test]
    fn test_differing_items_incomparable() {
        let a = sale(&[("Milk", 2)]);
        let b = same_id(&a, sale(&[("Milk", 3)]));
        match compare_sales(&a, &b) {
            Verdict::Incomparable(reason) => {
                assert!(reason.contains("milk x2"));
                assert!(reason.contains("milk x3"));
            }
            other => panic!("expected incomparable, got {:?}", other),
        }
    }
}
