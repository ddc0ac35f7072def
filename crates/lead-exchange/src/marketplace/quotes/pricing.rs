use serde::{Deserialize, Serialize};

/// VAT applied on top of the quoted subtotal, in percent.
pub const VAT_PERCENT: u64 = 5;

/// Line item as submitted by the professional. Amounts are in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemInput {
    pub category: String,
    pub quantity: u32,
    pub unit_price: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingInput {
    pub items: Vec<LineItemInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedItem {
    pub category: String,
    pub quantity: u32,
    pub unit_price: u64,
    pub total: u64,
}

/// Server computed totals; client supplied totals are never trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotePricing {
    pub items: Vec<PricedItem>,
    pub subtotal: u64,
    pub vat: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    #[error("quote must contain at least one line item")]
    NoItems,
    #[error("line item {index} is missing a category")]
    MissingCategory { index: usize },
    #[error("line item {index} must have a positive quantity")]
    ZeroQuantity { index: usize },
    #[error("quote amounts overflow")]
    Overflow,
}

impl QuotePricing {
    pub fn compute(input: &PricingInput) -> Result<Self, PricingError> {
        if input.items.is_empty() {
            return Err(PricingError::NoItems);
        }

        let mut items = Vec::with_capacity(input.items.len());
        let mut subtotal: u64 = 0;
        for (index, item) in input.items.iter().enumerate() {
            let category = item.category.trim();
            if category.is_empty() {
                return Err(PricingError::MissingCategory { index });
            }
            if item.quantity == 0 {
                return Err(PricingError::ZeroQuantity { index });
            }

            let total = item
                .unit_price
                .checked_mul(u64::from(item.quantity))
                .ok_or(PricingError::Overflow)?;
            subtotal = subtotal.checked_add(total).ok_or(PricingError::Overflow)?;
            items.push(PricedItem {
                category: category.to_string(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                total,
            });
        }

        let vat = subtotal
            .checked_mul(VAT_PERCENT)
            .and_then(|scaled| scaled.checked_add(50))
            .map(|scaled| scaled / 100)
            .ok_or(PricingError::Overflow)?;
        let total = subtotal.checked_add(vat).ok_or(PricingError::Overflow)?;

        Ok(Self {
            items,
            subtotal,
            vat,
            total,
        })
    }
}
