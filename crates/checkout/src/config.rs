//! Checkout configuration: order numbering, tax and shipping prices.

use domain::Money;

/// A shipping option with a fixed price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShippingMethod {
    pub code: String,
    pub label: String,
    pub price: Money,
}

/// Pricing and numbering configuration for the order workflow.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Prefix of human-readable order numbers (`REC-YYYYMMDD-NNNN`).
    pub order_number_prefix: String,

    /// Tax rate in basis points, applied to the order subtotal.
    pub tax_rate_bps: i64,

    /// Currency code stamped on orders and payments.
    pub currency: String,

    /// Available shipping methods.
    pub shipping_methods: Vec<ShippingMethod>,
}

impl CheckoutConfig {
    /// Looks up a shipping method by code.
    pub fn shipping_method(&self, code: &str) -> Option<&ShippingMethod> {
        self.shipping_methods.iter().find(|m| m.code == code)
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            order_number_prefix: "REC".to_string(),
            tax_rate_bps: 875,
            currency: "USD".to_string(),
            shipping_methods: vec![
                ShippingMethod {
                    code: "standard".to_string(),
                    label: "Standard (3-5 business days)".to_string(),
                    price: Money::from_cents(499),
                },
                ShippingMethod {
                    code: "express".to_string(),
                    label: "Express (1-2 business days)".to_string(),
                    price: Money::from_cents(1499),
                },
                ShippingMethod {
                    code: "pickup".to_string(),
                    label: "In-store pickup".to_string(),
                    price: Money::zero(),
                },
            ],
        }
    }
}
