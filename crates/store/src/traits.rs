//! Persistence ports consumed by the order workflow.

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{CartId, CouponId, OrderId, PaymentId, ProductId};
use domain::{Cart, CartOwner, Coupon, InventoryLevel, Order, Payment, ProductSnapshot};

use crate::error::Result;

/// Outcome of an atomic reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// The hold was placed.
    Reserved,
    /// Fewer than the requested units were available; nothing changed.
    Insufficient { available: u32 },
}

/// Outcome of an atomic deduction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeductOutcome {
    /// On-hand stock was decreased and the hold consumed.
    Deducted,
    /// On-hand stock did not cover the request; nothing changed.
    Insufficient { on_hand: u32 },
}

/// Outcome of an atomic coupon redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemOutcome {
    /// The usage count was incremented.
    Redeemed,
    /// The usage limit was already reached; nothing changed.
    Exhausted,
}

/// Read-only access to catalog products.
///
/// The catalog service owns these records; the workflow only reads
/// snapshots for price capture and order-line denormalization.
/// `put_product` exists for seeding and tests.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn product(&self, id: ProductId) -> Result<Option<ProductSnapshot>>;

    async fn put_product(&self, product: ProductSnapshot) -> Result<()>;
}

/// Inventory ledger persistence.
///
/// The check-and-mutate operations are atomic per product: no caller
/// can observe or interleave a partial reserve/deduct. `MemoryStore`
/// serializes them under one write lock, `PostgresStore` under
/// `SELECT ... FOR UPDATE`.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn inventory(&self, product_id: ProductId) -> Result<Option<InventoryLevel>>;

    async fn put_inventory(&self, level: InventoryLevel) -> Result<()>;

    /// Reserves `qty` units iff that many are available.
    async fn try_reserve(&self, product_id: ProductId, qty: u32) -> Result<ReserveOutcome>;

    /// Releases up to `qty` reserved units, clamping at zero.
    async fn release(&self, product_id: ProductId, qty: u32) -> Result<()>;

    /// Converts a hold into a permanent on-hand decrease.
    async fn try_deduct(&self, product_id: ProductId, qty: u32) -> Result<DeductOutcome>;

    /// Adds received stock, returning the updated level.
    async fn add_stock(&self, product_id: ProductId, qty: u32) -> Result<InventoryLevel>;

    /// Overwrites the on-hand count, returning the updated level.
    async fn set_stock(&self, product_id: ProductId, qty: u32) -> Result<InventoryLevel>;
}

/// Cart persistence, one active cart per owner.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn cart_for_owner(&self, owner: &CartOwner) -> Result<Option<Cart>>;

    async fn save_cart(&self, cart: &Cart) -> Result<()>;

    async fn delete_cart(&self, id: CartId) -> Result<()>;
}

/// Coupon lookup and atomic redemption accounting.
#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Looks up a coupon by its (case-insensitive) code.
    async fn coupon_by_code(&self, code: &str) -> Result<Option<Coupon>>;

    async fn put_coupon(&self, coupon: Coupon) -> Result<()>;

    /// Increments the usage count iff the usage limit permits.
    ///
    /// Concurrent redemptions racing toward the limit cannot overrun
    /// it: the increment and the limit check are one atomic step.
    async fn try_redeem(&self, id: CouponId) -> Result<RedeemOutcome>;

    /// Reverses one redemption after a failed checkout.
    async fn release_redemption(&self, id: CouponId) -> Result<()>;
}

/// Order persistence and daily sequence allocation.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: &Order) -> Result<()>;

    async fn order(&self, id: OrderId) -> Result<Option<Order>>;

    async fn update_order(&self, order: &Order) -> Result<()>;

    /// Returns the next position in `day`'s order sequence, starting
    /// at 1. Atomic under concurrent checkouts: two callers on the
    /// same day never receive the same value.
    async fn next_order_sequence(&self, day: NaiveDate) -> Result<u32>;
}

/// Payment attempt persistence.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_payment(&self, payment: &Payment) -> Result<()>;

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>>;

    async fn payment_by_intent(&self, intent_ref: &str) -> Result<Option<Payment>>;

    /// All attempts for an order, oldest first.
    async fn payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>>;

    async fn update_payment(&self, payment: &Payment) -> Result<()>;
}

/// Umbrella bound for a backend implementing every port.
pub trait Stores:
    ProductCatalog + InventoryStore + CartStore + CouponStore + OrderStore + PaymentStore
{
}

impl<T> Stores for T where
    T: ProductCatalog + InventoryStore + CartStore + CouponStore + OrderStore + PaymentStore
{
}
