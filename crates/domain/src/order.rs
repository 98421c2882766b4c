//! Order state machine and immutable order snapshot.

use chrono::{DateTime, NaiveDate, Utc};
use common::{OrderId, ProductId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cart::CartOwner;
use crate::money::Money;

/// Errors raised by order operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    /// The requested transition is not allowed from the current status.
    #[error("Invalid state transition: cannot {action} from {current_status} status")]
    InvalidStateTransition {
        current_status: OrderStatus,
        action: &'static str,
    },

    /// An order must contain at least one line.
    #[error("Order has no lines")]
    NoLines,
}

/// The status of an order in its lifecycle.
///
/// Status transitions:
/// ```text
/// Pending ──► Processing ──► Shipped ──► Delivered
///    │             │
///    ├─────────────┴──► Cancelled
///    └── (any non-terminal) ──► Refunded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Order created, awaiting payment confirmation.
    #[default]
    Pending,

    /// Payment confirmed, order is being prepared.
    Processing,

    /// Stock deducted and the parcel handed to the carrier.
    Shipped,

    /// Received by the customer (terminal state).
    Delivered,

    /// Cancelled before fulfillment (terminal state).
    Cancelled,

    /// Payment returned to the customer (terminal state).
    Refunded,
}

impl OrderStatus {
    /// Returns true if the order can still be cancelled.
    pub fn can_be_cancelled(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    /// Returns true if processing can start in this status.
    pub fn can_start_processing(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if the order can be shipped in this status.
    pub fn can_ship(&self) -> bool {
        matches!(self, OrderStatus::Processing)
    }

    /// Returns true if the order can be marked delivered.
    pub fn can_deliver(&self) -> bool {
        matches!(self, OrderStatus::Shipped)
    }

    /// Returns true if the order can move to refunded.
    pub fn can_refund(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "refunded" => Ok(OrderStatus::Refunded),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// Formats a human-readable order number: `PREFIX-YYYYMMDD-NNNN`.
///
/// `seq` is the order's position in that day's sequence, starting at 1.
pub fn format_order_number(prefix: &str, day: NaiveDate, seq: u32) -> String {
    format!("{prefix}-{}-{seq:04}", day.format("%Y%m%d"))
}

/// A cart line frozen into an order.
///
/// Title, artist, format and cover are denormalized so historical
/// orders render correctly even if the product is later edited or
/// deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub title: String,
    pub artist: String,
    pub format: String,
    pub cover_image: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

impl OrderLine {
    pub fn new(
        product_id: ProductId,
        title: impl Into<String>,
        artist: impl Into<String>,
        format: impl Into<String>,
        cover_image: Option<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id,
            title: title.into(),
            artist: artist.into(),
            format: format.into(),
            cover_image,
            quantity,
            unit_price,
            line_total: unit_price.multiply(quantity),
        }
    }
}

/// Inputs for [`Order::place`].
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub id: OrderId,
    pub order_number: String,
    pub placed_by: CartOwner,
    pub lines: Vec<OrderLine>,
    pub coupon_code: Option<String>,
    pub discount_amount: Money,
    pub shipping_amount: Money,
    pub tax_amount: Money,
    pub shipping_method: String,
    pub shipping_address: serde_json::Value,
    pub billing_address: serde_json::Value,
    pub customer_notes: Option<String>,
    pub currency: String,
}

/// An order with its immutable monetary snapshot.
///
/// Amounts, lines and addresses are fixed at creation time; only the
/// status and its timestamps change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    order_number: String,
    placed_by: CartOwner,
    status: OrderStatus,
    lines: Vec<OrderLine>,
    subtotal: Money,
    discount_amount: Money,
    shipping_amount: Money,
    tax_amount: Money,
    total: Money,
    coupon_code: Option<String>,
    shipping_method: String,
    shipping_address: serde_json::Value,
    billing_address: serde_json::Value,
    customer_notes: Option<String>,
    currency: String,
    created_at: DateTime<Utc>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Creates a pending order from a draft, computing the subtotal
    /// from the lines and the total as
    /// `max(0, subtotal - discount) + shipping + tax`.
    pub fn place(draft: OrderDraft, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if draft.lines.is_empty() {
            return Err(OrderError::NoLines);
        }

        let subtotal: Money = draft.lines.iter().map(|l| l.line_total).sum();
        let total = subtotal.saturating_sub(draft.discount_amount)
            + draft.shipping_amount
            + draft.tax_amount;

        Ok(Self {
            id: draft.id,
            order_number: draft.order_number,
            placed_by: draft.placed_by,
            status: OrderStatus::Pending,
            lines: draft.lines,
            subtotal,
            discount_amount: draft.discount_amount,
            shipping_amount: draft.shipping_amount,
            tax_amount: draft.tax_amount,
            total,
            coupon_code: draft.coupon_code,
            shipping_method: draft.shipping_method,
            shipping_address: draft.shipping_address,
            billing_address: draft.billing_address,
            customer_notes: draft.customer_notes,
            currency: draft.currency,
            created_at: now,
            shipped_at: None,
            delivered_at: None,
        })
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn placed_by(&self) -> &CartOwner {
        &self.placed_by
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn discount_amount(&self) -> Money {
        self.discount_amount
    }

    pub fn shipping_amount(&self) -> Money {
        self.shipping_amount
    }

    pub fn tax_amount(&self) -> Money {
        self.tax_amount
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn coupon_code(&self) -> Option<&str> {
        self.coupon_code.as_deref()
    }

    pub fn shipping_method(&self) -> &str {
        &self.shipping_method
    }

    pub fn shipping_address(&self) -> &serde_json::Value {
        &self.shipping_address
    }

    pub fn billing_address(&self) -> &serde_json::Value {
        &self.billing_address
    }

    pub fn customer_notes(&self) -> Option<&str> {
        self.customer_notes.as_deref()
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn shipped_at(&self) -> Option<DateTime<Utc>> {
        self.shipped_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn can_be_cancelled(&self) -> bool {
        self.status.can_be_cancelled()
    }

    /// Pending → Processing, driven by payment confirmation.
    pub fn begin_processing(&mut self) -> Result<(), OrderError> {
        if !self.status.can_start_processing() {
            return Err(OrderError::InvalidStateTransition {
                current_status: self.status,
                action: "start processing",
            });
        }
        self.status = OrderStatus::Processing;
        Ok(())
    }

    /// Processing → Shipped, stamping `shipped_at`.
    pub fn ship(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_ship() {
            return Err(OrderError::InvalidStateTransition {
                current_status: self.status,
                action: "ship",
            });
        }
        self.status = OrderStatus::Shipped;
        self.shipped_at = Some(now);
        Ok(())
    }

    /// Shipped → Delivered, stamping `delivered_at`.
    pub fn deliver(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_deliver() {
            return Err(OrderError::InvalidStateTransition {
                current_status: self.status,
                action: "deliver",
            });
        }
        self.status = OrderStatus::Delivered;
        self.delivered_at = Some(now);
        Ok(())
    }

    /// Pending|Processing → Cancelled.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if !self.status.can_be_cancelled() {
            return Err(OrderError::InvalidStateTransition {
                current_status: self.status,
                action: "cancel",
            });
        }
        self.status = OrderStatus::Cancelled;
        Ok(())
    }

    /// Any non-terminal status → Refunded.
    pub fn refund(&mut self) -> Result<(), OrderError> {
        if !self.status.can_refund() {
            return Err(OrderError::InvalidStateTransition {
                current_status: self.status,
                action: "refund",
            });
        }
        self.status = OrderStatus::Refunded;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::CustomerId;

    fn draft() -> OrderDraft {
        OrderDraft {
            id: OrderId::new(),
            order_number: "REC-20260806-0001".to_string(),
            placed_by: CartOwner::Customer(CustomerId::new()),
            lines: vec![OrderLine::new(
                ProductId::new(),
                "Kind of Blue",
                "Miles Davis",
                "LP",
                None,
                2,
                Money::from_cents(1000),
            )],
            coupon_code: None,
            discount_amount: Money::zero(),
            shipping_amount: Money::from_cents(500),
            tax_amount: Money::from_cents(175),
            shipping_method: "standard".to_string(),
            shipping_address: serde_json::json!({"city": "Portland"}),
            billing_address: serde_json::json!({"city": "Portland"}),
            customer_notes: None,
            currency: "USD".to_string(),
        }
    }

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn test_can_be_cancelled() {
        assert!(OrderStatus::Pending.can_be_cancelled());
        assert!(OrderStatus::Processing.can_be_cancelled());
        assert!(!OrderStatus::Shipped.can_be_cancelled());
        assert!(!OrderStatus::Delivered.can_be_cancelled());
        assert!(!OrderStatus::Cancelled.can_be_cancelled());
        assert!(!OrderStatus::Refunded.can_be_cancelled());
    }

    #[test]
    fn test_forward_transitions() {
        assert!(OrderStatus::Pending.can_start_processing());
        assert!(!OrderStatus::Processing.can_start_processing());

        assert!(OrderStatus::Processing.can_ship());
        assert!(!OrderStatus::Pending.can_ship());
        assert!(!OrderStatus::Cancelled.can_ship());

        assert!(OrderStatus::Shipped.can_deliver());
        assert!(!OrderStatus::Processing.can_deliver());
    }

    #[test]
    fn test_refund_from_any_non_terminal() {
        assert!(OrderStatus::Pending.can_refund());
        assert!(OrderStatus::Processing.can_refund());
        assert!(OrderStatus::Shipped.can_refund());
        assert!(!OrderStatus::Delivered.can_refund());
        assert!(!OrderStatus::Cancelled.can_refund());
        assert!(!OrderStatus::Refunded.can_refund());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
        assert!(!OrderStatus::Shipped.is_terminal());
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Refunded.is_terminal());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("paid".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_format_order_number() {
        let day = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();
        assert_eq!(format_order_number("REC", day, 1), "REC-20260806-0001");
        assert_eq!(format_order_number("REC", day, 42), "REC-20260806-0042");
        assert_eq!(format_order_number("REC", day, 12345), "REC-20260806-12345");
    }

    #[test]
    fn test_place_computes_totals() {
        let order = Order::place(draft(), Utc::now()).unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.subtotal().cents(), 2000);
        // 2000 - 0 + 500 + 175
        assert_eq!(order.total().cents(), 2675);
    }

    #[test]
    fn test_place_total_floors_discount_at_subtotal() {
        let mut d = draft();
        d.discount_amount = Money::from_cents(10_000);
        let order = Order::place(d, Utc::now()).unwrap();
        // max(0, 2000 - 10000) + 500 + 175
        assert_eq!(order.total().cents(), 675);
    }

    #[test]
    fn test_place_rejects_empty_lines() {
        let mut d = draft();
        d.lines.clear();
        assert_eq!(Order::place(d, Utc::now()), Err(OrderError::NoLines));
    }

    #[test]
    fn test_happy_path_transitions_stamp_timestamps() {
        let mut order = Order::place(draft(), Utc::now()).unwrap();
        let now = Utc::now();

        order.begin_processing().unwrap();
        assert_eq!(order.status(), OrderStatus::Processing);

        order.ship(now).unwrap();
        assert_eq!(order.status(), OrderStatus::Shipped);
        assert_eq!(order.shipped_at(), Some(now));

        order.deliver(now).unwrap();
        assert_eq!(order.status(), OrderStatus::Delivered);
        assert_eq!(order.delivered_at(), Some(now));
    }

    #[test]
    fn test_cannot_cancel_shipped_order() {
        let mut order = Order::place(draft(), Utc::now()).unwrap();
        order.begin_processing().unwrap();
        order.ship(Utc::now()).unwrap();

        let err = order.cancel().unwrap_err();
        assert_eq!(
            err,
            OrderError::InvalidStateTransition {
                current_status: OrderStatus::Shipped,
                action: "cancel",
            }
        );
        assert_eq!(order.status(), OrderStatus::Shipped);
    }

    #[test]
    fn test_cancelled_order_cannot_ship() {
        let mut order = Order::place(draft(), Utc::now()).unwrap();
        order.cancel().unwrap();
        assert!(order.ship(Utc::now()).is_err());
        assert!(order.refund().is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let order = Order::place(draft(), Utc::now()).unwrap();
        let json = serde_json::to_string(&order).unwrap();
        let deserialized: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order, deserialized);
    }
}
