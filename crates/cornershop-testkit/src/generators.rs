//! Proptest generators for property-based testing.

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use cornershop_core::{Decimal, Product, Sale, SaleId, SaleItem};

/// Generate a random SaleId.
pub fn sale_id() -> impl Strategy<Value = SaleId> {
    any::<[u8; 12]>().prop_map(SaleId::from_bytes)
}

/// Generate a product name.
pub fn product_name() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{2,9}".prop_map(String::from)
}

/// Generate a category.
pub fn category() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Dairy".to_string()),
        Just("Bakery".to_string()),
        Just("Produce".to_string()),
        Just("Household".to_string()),
    ]
}

/// Generate a price between 0.00 and 99.99.
pub fn price() -> impl Strategy<Value = Decimal> {
    (0i64..10_000).prop_map(|cents| Decimal::new(cents, 2))
}

/// Generate a stock level.
pub fn stock() -> impl Strategy<Value = i64> {
    0i64..=50
}

/// Generate a valid product.
pub fn product() -> impl Strategy<Value = Product> {
    (product_name(), category(), price(), stock())
        .prop_map(|(name, category, price, stock)| Product::new(name, category, price, stock))
}

/// Generate a catalogue with unique names (ignoring case).
pub fn catalogue(max_len: usize) -> impl Strategy<Value = Vec<Product>> {
    prop::collection::vec(product(), 0..=max_len).prop_map(|products| {
        let unique: BTreeMap<String, Product> =
            products.into_iter().map(|p| (p.key(), p)).collect();
        unique.into_values().collect()
    })
}

/// Generate a sale whose items name products from `names`.
pub fn sale(names: Vec<String>) -> impl Strategy<Value = Sale> {
    let item = (prop::sample::select(names), 1i64..=5, price())
        .prop_map(|(name, quantity, price)| SaleItem::new(name, quantity, price));
    (
        sale_id(),
        0i64..=4_102_444_800_000,
        prop::collection::vec(item, 1..=4),
    )
        .prop_map(|(id, millis, items)| {
            let date = Utc
                .timestamp_millis_opt(millis)
                .single()
                .unwrap_or_else(Utc::now);
            Sale::new(id, date, items)
        })
}

/// How one side of a store pair deviates from a shared catalogue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drift {
    /// Identical on both sides.
    Same,
    /// Present only in the document store.
    DocumentOnly,
    /// Present only in the relational store.
    RelationalOnly,
    /// Stock differs by the given non-zero amount.
    Stock(i64),
    /// Price differs.
    Price,
}

/// Generate a drift.
pub fn drift() -> impl Strategy<Value = Drift> {
    prop_oneof![
        Just(Drift::Same),
        Just(Drift::DocumentOnly),
        Just(Drift::RelationalOnly),
        (1i64..=10).prop_map(Drift::Stock),
        (-10i64..=-1).prop_map(Drift::Stock),
        Just(Drift::Price),
    ]
}

/// Two divergent snapshots of one catalogue: `(document, relational)`.
pub fn divergent_catalogues(max_len: usize) -> impl Strategy<Value = (Vec<Product>, Vec<Product>)> {
    catalogue(max_len)
        .prop_flat_map(|products| {
            let len = products.len();
            (Just(products), prop::collection::vec(drift(), len))
        })
        .prop_map(|(products, drifts)| {
            let mut document = Vec::new();
            let mut relational = Vec::new();
            for (product, drift) in products.into_iter().zip(drifts) {
                match drift {
                    Drift::Same => {
                        document.push(product.clone());
                        relational.push(product);
                    }
                    Drift::DocumentOnly => document.push(product),
                    Drift::RelationalOnly => relational.push(product),
                    Drift::Stock(delta) => {
                        let shifted = (product.stock_quantity + delta).max(0);
                        document.push(product.with_stock(shifted));
                        relational.push(product);
                    }
                    Drift::Price => {
                        let mut repriced = product.clone();
                        repriced.price += Decimal::ONE;
                        document.push(repriced);
                        relational.push(product);
                    }
                }
            }
            (document, relational)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    proptest! {
        #[test]
        fn catalogue_names_unique(products in catalogue(12)) {
            let keys: HashSet<_> = products.iter().map(|p| p.key()).collect();
            prop_assert_eq!(keys.len(), products.len());
        }

        #[test]
        fn generated_sales_are_valid(s in sale(vec!["Milk".into(), "Bread".into()])) {
            prop_assert!(cornershop_core::validate_sale(&s).is_ok());
        }
    }
}
