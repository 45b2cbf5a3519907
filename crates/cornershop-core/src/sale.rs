//! Sales and the items they own.

use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::product::product_key;
use crate::types::SaleId;

/// Normalise a money amount to exactly two fractional digits.
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// One line of a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItem {
    /// Weak reference to a product by name.
    pub product_name: String,
    /// Units sold, always positive.
    pub quantity: i64,
    /// Unit price at the time of sale.
    pub unit_price: Decimal,
}

impl SaleItem {
    pub fn new(product_name: impl Into<String>, quantity: i64, unit_price: Decimal) -> Self {
        Self {
            product_name: product_name.into(),
            quantity,
            unit_price: round_money(unit_price),
        }
    }

    /// Price of this line.
    pub fn line_total(&self) -> Decimal {
        round_money(self.unit_price * Decimal::from(self.quantity))
    }
}

/// A sale not yet recorded by any store.
///
/// Stores turn a draft into a [`Sale`] by minting its [`SaleId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleDraft {
    pub date: DateTime<Utc>,
    pub items: Vec<SaleItem>,
}

impl SaleDraft {
    /// A draft dated now.
    pub fn new(items: Vec<SaleItem>) -> Self {
        Self {
            date: Utc::now(),
            items,
        }
    }

    /// Sum of the line totals.
    pub fn total(&self) -> Decimal {
        items_total(&self.items)
    }

    /// Turn the draft into a sale with the given identifier.
    pub fn into_sale(self, id: SaleId) -> Sale {
        Sale::new(id, self.date, self.items)
    }
}

/// A recorded sale.
///
/// Cancellation is a flag rather than a deletion so both stores keep the same
/// set of sale ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    #[serde(rename = "_id")]
    pub id: SaleId,
    pub date: DateTime<Utc>,
    pub items: Vec<SaleItem>,
    pub total: Decimal,
    pub is_cancelled: bool,
}

impl Sale {
    /// Build a sale, computing its total and truncating the timestamp to
    /// milliseconds (the precision both stores keep).
    pub fn new(id: SaleId, date: DateTime<Utc>, items: Vec<SaleItem>) -> Self {
        let total = items_total(&items);
        Self {
            id,
            date: date.trunc_subsecs(3),
            items,
            total,
            is_cancelled: false,
        }
    }

    /// Copy of this sale with the cancelled flag set.
    pub fn cancelled(&self) -> Self {
        Self {
            is_cancelled: true,
            ..self.clone()
        }
    }

    /// Sum of the line totals (may differ from `total` if the record is corrupt).
    pub fn computed_total(&self) -> Decimal {
        items_total(&self.items)
    }

    /// The items as a sorted multiset of `(product key, quantity)`.
    ///
    /// Two sales with equal signatures sold the same things, regardless of
    /// line order or name casing.
    pub fn item_signature(&self) -> Vec<(String, i64)> {
        let mut signature: Vec<(String, i64)> = self
            .items
            .iter()
            .map(|item| (product_key(&item.product_name), item.quantity))
            .collect();
        signature.sort();
        signature
    }
}

fn items_total(items: &[SaleItem]) -> Decimal {
    round_money(items.iter().map(SaleItem::line_total).sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_items() -> Vec<SaleItem> {
        vec![
            SaleItem::new("Milk", 2, Decimal::new(250, 2)),
            SaleItem::new("Bread", 1, Decimal::new(199, 2)),
        ]
    }

    #[test]
    fn test_round_money() {
        assert_eq!(round_money(Decimal::new(5, 0)).to_string(), "5.00");
        assert_eq!(round_money(Decimal::new(1005, 3)).to_string(), "1.01");
        assert_eq!(round_money(Decimal::new(-1005, 3)).to_string(), "-1.01");
    }

    #[test]
    fn test_total_is_sum_of_lines() {
        let draft = SaleDraft::new(sample_items());
        assert_eq!(draft.total(), Decimal::new(699, 2));

        let sale = draft.into_sale(SaleId::generate());
        assert_eq!(sale.total, Decimal::new(699, 2));
        assert_eq!(sale.total, sale.computed_total());
        assert!(!sale.is_cancelled);
    }

    #[test]
    fn test_date_truncated_to_millis() {
        let date = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let sale = Sale::new(SaleId::generate(), date, sample_items());
        assert_eq!(sale.date.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn test_item_signature_ignores_order_and_case() {
        let id = SaleId::generate();
        let a = Sale::new(id.clone(), Utc::now(), sample_items());
        let mut reversed = sample_items();
        reversed.reverse();
        reversed[0].product_name = "BREAD".into();
        let b = Sale::new(id, Utc::now(), reversed);
        assert_eq!(a.item_signature(), b.item_signature());
    }

    #[test]
    fn test_document_field_names() {
        let sale = Sale::new(SaleId::from_bytes([1; 12]), Utc::now(), sample_items());
        let json = serde_json::to_value(&sale).unwrap();
        assert!(json.get("_id").is_some());
        assert!(json.get("isCancelled").is_some());
        assert!(json["items"][0].get("productName").is_some());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn round_money_is_stable(cents in -1_000_000i64..1_000_000, extra in 0u32..4) {
                let value = Decimal::new(cents, 2 + extra);
                let once = round_money(value);
                prop_assert_eq!(once.scale(), 2);
                prop_assert_eq!(round_money(once), once);
            }

            #[test]
            fn total_matches_lines(lines in prop::collection::vec((1i64..50, 0i64..10_000), 1..6)) {
                let items: Vec<SaleItem> = lines
                    .iter()
                    .map(|&(qty, cents)| SaleItem::new("Milk", qty, Decimal::new(cents, 2)))
                    .collect();
                let expected: i64 = lines.iter().map(|&(qty, cents)| qty * cents).sum();
                let sale = Sale::new(SaleId::generate(), Utc::now(), items);
                prop_assert_eq!(sale.total, Decimal::new(expected, 2));
            }
        }
    }
}
