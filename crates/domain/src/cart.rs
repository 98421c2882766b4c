//! Shopping cart aggregate.

use chrono::{DateTime, Duration, Utc};
use common::{CartId, CustomerId, ProductId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coupon::{Coupon, CouponError};
use crate::money::Money;
use crate::product::ProductSnapshot;

/// Upper bound on the quantity of a single cart line.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// Lifetime of a guest cart after its last creation.
pub const GUEST_CART_TTL: Duration = Duration::days(7);

/// Errors raised by cart operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartError {
    /// Quantity must be between 1 and [`MAX_LINE_QUANTITY`].
    #[error("Invalid quantity: {quantity} (must be between 1 and {MAX_LINE_QUANTITY})")]
    InvalidQuantity { quantity: u32 },

    /// No line exists for the given product.
    #[error("No cart line for product {product_id}")]
    LineNotFound { product_id: ProductId },

    /// The submitted coupon was rejected.
    #[error(transparent)]
    Coupon(#[from] CouponError),
}

/// Who a cart belongs to: a signed-in customer or a guest session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartOwner {
    Customer(CustomerId),
    Guest(String),
}

impl std::fmt::Display for CartOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CartOwner::Customer(id) => write!(f, "customer:{id}"),
            CartOwner::Guest(session) => write!(f, "guest:{session}"),
        }
    }
}

/// One product in a cart.
///
/// `unit_price` is the effective price captured when the line was
/// created and is never re-derived from the live product, so totals
/// stay stable while the customer shops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub title: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl CartLine {
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Totals for a cart as currently composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
}

/// A mutable collection of lines plus an optional applied coupon.
///
/// Lines are kept in insertion order, one per distinct product;
/// re-adding a product merges into its existing line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    id: CartId,
    owner: CartOwner,
    lines: Vec<CartLine>,
    coupon_code: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty cart for a signed-in customer. Customer carts
    /// do not expire.
    pub fn for_customer(customer_id: CustomerId, now: DateTime<Utc>) -> Self {
        Self::new(CartOwner::Customer(customer_id), None, now)
    }

    /// Creates an empty guest cart that expires after
    /// [`GUEST_CART_TTL`].
    pub fn for_guest(session: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::new(CartOwner::Guest(session.into()), Some(now + GUEST_CART_TTL), now)
    }

    fn new(owner: CartOwner, expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        Self {
            id: CartId::new(),
            owner,
            lines: Vec::new(),
            coupon_code: None,
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> CartId {
        self.id
    }

    pub fn owner(&self) -> &CartOwner {
        &self.owner
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn line(&self, product_id: ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    pub fn coupon_code(&self) -> Option<&str> {
        self.coupon_code.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// True when a guest cart has outlived its TTL.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }

    /// Adds `qty` units of a product.
    ///
    /// An existing line keeps its originally captured unit price and
    /// grows by `qty`, capped at [`MAX_LINE_QUANTITY`]; a new line
    /// captures the product's current effective price.
    pub fn add_item(
        &mut self,
        product: &ProductSnapshot,
        qty: u32,
        now: DateTime<Utc>,
    ) -> Result<(), CartError> {
        if qty == 0 {
            return Err(CartError::InvalidQuantity { quantity: qty });
        }

        match self.lines.iter_mut().find(|l| l.product_id == product.id) {
            Some(line) => {
                line.quantity = (line.quantity + qty).min(MAX_LINE_QUANTITY);
            }
            None => {
                self.lines.push(CartLine {
                    product_id: product.id,
                    title: product.title.clone(),
                    quantity: qty.min(MAX_LINE_QUANTITY),
                    unit_price: product.effective_price(),
                });
            }
        }
        self.updated_at = now;
        Ok(())
    }

    /// Sets a line's quantity. Zero removes the line; quantities above
    /// [`MAX_LINE_QUANTITY`] are rejected.
    pub fn update_item(
        &mut self,
        product_id: ProductId,
        qty: u32,
        now: DateTime<Utc>,
    ) -> Result<(), CartError> {
        if qty > MAX_LINE_QUANTITY {
            return Err(CartError::InvalidQuantity { quantity: qty });
        }
        if qty == 0 {
            return self.remove_item(product_id, now);
        }

        let line = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or(CartError::LineNotFound { product_id })?;
        line.quantity = qty;
        self.updated_at = now;
        Ok(())
    }

    /// Removes a product's line.
    pub fn remove_item(
        &mut self,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<(), CartError> {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        if self.lines.len() == before {
            return Err(CartError::LineNotFound { product_id });
        }
        self.updated_at = now;
        Ok(())
    }

    /// Empties the cart and detaches any coupon.
    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.lines.clear();
        self.coupon_code = None;
        self.updated_at = now;
    }

    /// Attaches a coupon after validating it against the current
    /// subtotal. Re-applying replaces the previous code; discounts
    /// never stack.
    pub fn apply_coupon(&mut self, coupon: &Coupon, now: DateTime<Utc>) -> Result<(), CartError> {
        coupon.check_applicable(self.subtotal(), now)?;
        self.coupon_code = Some(coupon.code().to_string());
        self.updated_at = now;
        Ok(())
    }

    /// Detaches the applied coupon, if any.
    pub fn remove_coupon(&mut self, now: DateTime<Utc>) {
        self.coupon_code = None;
        self.updated_at = now;
    }

    /// Sum of line totals at their captured unit prices.
    pub fn subtotal(&self) -> Money {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Computes subtotal, discount and total. The caller supplies the
    /// coupon resolved from [`Cart::coupon_code`], if any.
    pub fn totals(&self, coupon: Option<&Coupon>, now: DateTime<Utc>) -> CartTotals {
        let subtotal = self.subtotal();
        let discount = coupon
            .map(|c| c.discount_for(subtotal, now))
            .unwrap_or_default();
        CartTotals {
            subtotal,
            discount,
            total: subtotal.saturating_sub(discount),
        }
    }
}
