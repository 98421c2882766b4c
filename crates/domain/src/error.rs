//! Domain error types.

use thiserror::Error;

use crate::cart::CartError;
use crate::coupon::CouponError;
use crate::inventory::InventoryError;
use crate::order::OrderError;
use crate::payment::PaymentError;
use crate::product::ProductError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the cart aggregate.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// An error occurred in the coupon evaluator.
    #[error("Coupon error: {0}")]
    Coupon(#[from] CouponError),

    /// An error occurred in the inventory ledger.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// An error occurred in the order state machine.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// An error occurred in the payment state machine.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// An error occurred validating a product snapshot.
    #[error("Product error: {0}")]
    Product(#[from] ProductError),
}
