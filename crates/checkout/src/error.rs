//! Checkout error types.

use common::{OrderId, ProductId};
use domain::{CouponError, OrderError, PaymentError};
use store::StoreError;
use thiserror::Error;

use crate::gateway::GatewayError;

/// Errors that can occur during the order workflow.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Checkout attempted against an empty (or expired) cart.
    #[error("Cart is empty")]
    CartEmpty,

    /// A reservation failed; no partial reservation is left behind.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The attached coupon did not survive re-validation at checkout.
    #[error("Coupon rejected: {0}")]
    CouponRejected(#[from] CouponError),

    /// The requested shipping method is not configured.
    #[error("Unknown shipping method: {0}")]
    UnknownShippingMethod(String),

    /// A cart line references a product the catalog no longer has.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// No order exists with the given ID.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// No payment exists for the given reference.
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    /// Payment cannot be attempted for this order.
    #[error("Payment not allowed: {0}")]
    PaymentNotAllowed(String),

    /// The payment processor rejected or failed the request.
    #[error("Payment processor error: {0}")]
    Gateway(#[from] GatewayError),

    /// An order state transition was rejected.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// A payment state transition was rejected.
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// The store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for workflow operations.
pub type Result<T> = std::result::Result<T, CheckoutError>;
