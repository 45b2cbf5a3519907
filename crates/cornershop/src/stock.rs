//! Stock check report: every product grouped by category with a status.

use std::collections::BTreeMap;
use std::fmt;

use cornershop_core::Product;
use serde::Serialize;

/// At or below this many units a product is low on stock.
pub const LOW_STOCK_THRESHOLD: i64 = 5;

/// Stock status of one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    OutOfStock,
    LowStock,
    InStock,
}

impl StockStatus {
    /// Status for a stock level.
    pub fn of(stock: i64) -> Self {
        match stock {
            s if s <= 0 => StockStatus::OutOfStock,
            s if s <= LOW_STOCK_THRESHOLD => StockStatus::LowStock,
            _ => StockStatus::InStock,
        }
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StockStatus::OutOfStock => f.write_str("OUT OF STOCK"),
            StockStatus::LowStock => f.write_str("LOW STOCK"),
            StockStatus::InStock => f.write_str("In Stock"),
        }
    }
}

/// One product line in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLine {
    pub name: String,
    pub stock: i64,
    pub status: StockStatus,
}

/// Products of one category, sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryStock {
    pub category: String,
    pub products: Vec<StockLine>,
}

/// The full stock check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StockReport {
    /// Categories sorted by name.
    pub categories: Vec<CategoryStock>,
    pub total_products: usize,
    pub out_of_stock: usize,
    /// Products with some stock, but no more than [`LOW_STOCK_THRESHOLD`].
    pub low_stock: usize,
}

impl StockReport {
    /// Build the report from a product listing.
    pub fn from_products(products: Vec<Product>) -> Self {
        let total_products = products.len();
        let mut by_category: BTreeMap<String, Vec<StockLine>> = BTreeMap::new();
        let mut out_of_stock = 0;
        let mut low_stock = 0;

        for product in products {
            let status = StockStatus::of(product.stock_quantity);
            match status {
                StockStatus::OutOfStock => out_of_stock += 1,
                StockStatus::LowStock => low_stock += 1,
                StockStatus::InStock => {}
            }
            by_category
                .entry(product.category)
                .or_default()
                .push(StockLine {
                    name: product.name,
                    stock: product.stock_quantity,
                    status,
                });
        }

        let categories = by_category
            .into_iter()
            .map(|(category, mut products)| {
                products.sort_by(|a, b| a.name.cmp(&b.name));
                CategoryStock { category, products }
            })
            .collect();

        Self {
            categories,
            total_products,
            out_of_stock,
            low_stock,
        }
    }
}

impl fmt::Display for StockReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for category in &self.categories {
            writeln!(f, "{}:", category.category)?;
            writeln!(f, "{}", "-".repeat(40))?;
            for line in &category.products {
                writeln!(f, "{:<20} {:>4} units  ({})", line.name, line.stock, line.status)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "Total Products: {}", self.total_products)?;
        writeln!(f, "Out of Stock: {}", self.out_of_stock)?;
        write!(f, "Low Stock: {}", self.low_stock)
    }
}
