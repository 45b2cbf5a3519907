//! Structural validation of products and sales.
//!
//! Stores validate before writing; the sync engine relies on every stored
//! value having passed these checks.

use rust_decimal::Decimal;

use crate::error::ValidationError;
use crate::product::Product;
use crate::sale::{Sale, SaleDraft, SaleItem};

/// Validate a product's fields.
pub fn validate_product(product: &Product) -> Result<(), ValidationError> {
    if product.name.trim().is_empty() {
        return Err(ValidationError::EmptyProductName);
    }
    if product.category.trim().is_empty() {
        return Err(ValidationError::EmptyCategory);
    }
    if product.price < Decimal::ZERO {
        return Err(ValidationError::NegativePrice {
            name: product.name.clone(),
            price: product.price.to_string(),
        });
    }
    if product.stock_quantity < 0 {
        return Err(ValidationError::NegativeStock {
            name: product.name.clone(),
            stock: product.stock_quantity,
        });
    }
    Ok(())
}

/// Validate a draft before a store records it.
pub fn validate_sale_draft(draft: &SaleDraft) -> Result<(), ValidationError> {
    validate_items(&draft.items)
}

/// Validate a recorded sale, including that its total matches its items.
pub fn validate_sale(sale: &Sale) -> Result<(), ValidationError> {
    validate_items(&sale.items)?;
    let computed = sale.computed_total();
    if computed != sale.total {
        return Err(ValidationError::TotalMismatch {
            recorded: sale.total.to_string(),
            computed: computed.to_string(),
        });
    }
    Ok(())
}

fn validate_items(items: &[SaleItem]) -> Result<(), ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::EmptySale);
    }
    for item in items {
        if item.product_name.trim().is_empty() {
            return Err(ValidationError::EmptyProductName);
        }
        if item.quantity <= 0 {
            return Err(ValidationError::NonPositiveQuantity {
                name: item.product_name.clone(),
                quantity: item.quantity,
            });
        }
        if item.unit_price < Decimal::ZERO {
            return Err(ValidationError::NegativePrice {
                name: item.product_name.clone(),
                price: item.unit_price.to_string(),
            });
        }
    }
    Ok(())
}
