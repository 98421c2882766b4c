//! In-memory store implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{CartId, CouponId, OrderId, PaymentId, ProductId};
use domain::{Cart, CartOwner, Coupon, InventoryLevel, Order, Payment, ProductSnapshot};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::traits::{
    CartStore, CouponStore, DeductOutcome, InventoryStore, OrderStore, PaymentStore,
    ProductCatalog, RedeemOutcome, ReserveOutcome,
};

#[derive(Debug, Default)]
struct MemoryState {
    products: HashMap<ProductId, ProductSnapshot>,
    inventory: HashMap<ProductId, InventoryLevel>,
    carts: HashMap<CartId, Cart>,
    coupons: HashMap<CouponId, Coupon>,
    orders: HashMap<OrderId, Order>,
    order_seqs: HashMap<NaiveDate, u32>,
    payments: HashMap<PaymentId, Payment>,
}

/// In-memory implementation of every persistence port.
///
/// Backs the test suites and the default server. All check-and-mutate
/// operations run under the single write lock, which is what makes
/// reservation, redemption and sequence allocation atomic here.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a product together with its inventory record.
    pub async fn seed_album(&self, product: ProductSnapshot, quantity: u32) {
        let mut state = self.state.write().await;
        state
            .inventory
            .insert(product.id, InventoryLevel::new(product.id, quantity, 5));
        state.products.insert(product.id, product);
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the number of stored payment attempts.
    pub async fn payment_count(&self) -> usize {
        self.state.read().await.payments.len()
    }

    /// Clears all state.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        *state = MemoryState::default();
    }
}

#[async_trait]
impl ProductCatalog for MemoryStore {
    async fn product(&self, id: ProductId) -> Result<Option<ProductSnapshot>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn put_product(&self, product: ProductSnapshot) -> Result<()> {
        self.state.write().await.products.insert(product.id, product);
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn inventory(&self, product_id: ProductId) -> Result<Option<InventoryLevel>> {
        Ok(self.state.read().await.inventory.get(&product_id).cloned())
    }

    async fn put_inventory(&self, level: InventoryLevel) -> Result<()> {
        self.state
            .write()
            .await
            .inventory
            .insert(level.product_id(), level);
        Ok(())
    }

    async fn try_reserve(&self, product_id: ProductId, qty: u32) -> Result<ReserveOutcome> {
        let mut state = self.state.write().await;
        let level = state
            .inventory
            .get_mut(&product_id)
            .ok_or_else(|| not_found("inventory", product_id.to_string()))?;

        match level.reserve(qty) {
            Ok(()) => Ok(ReserveOutcome::Reserved),
            Err(_) => Ok(ReserveOutcome::Insufficient {
                available: level.available(),
            }),
        }
    }

    async fn release(&self, product_id: ProductId, qty: u32) -> Result<()> {
        let mut state = self.state.write().await;
        let level = state
            .inventory
            .get_mut(&product_id)
            .ok_or_else(|| not_found("inventory", product_id.to_string()))?;
        level.release(qty);
        Ok(())
    }

    async fn try_deduct(&self, product_id: ProductId, qty: u32) -> Result<DeductOutcome> {
        let mut state = self.state.write().await;
        let level = state
            .inventory
            .get_mut(&product_id)
            .ok_or_else(|| not_found("inventory", product_id.to_string()))?;

        match level.deduct(qty) {
            Ok(()) => Ok(DeductOutcome::Deducted),
            Err(_) => Ok(DeductOutcome::Insufficient {
                on_hand: level.quantity(),
            }),
        }
    }

    async fn add_stock(&self, product_id: ProductId, qty: u32) -> Result<InventoryLevel> {
        let mut state = self.state.write().await;
        let level = state
            .inventory
            .get_mut(&product_id)
            .ok_or_else(|| not_found("inventory", product_id.to_string()))?;
        level.add_stock(qty);
        Ok(level.clone())
    }

    async fn set_stock(&self, product_id: ProductId, qty: u32) -> Result<InventoryLevel> {
        let mut state = self.state.write().await;
        let level = state
            .inventory
            .get_mut(&product_id)
            .ok_or_else(|| not_found("inventory", product_id.to_string()))?;
        level.set_quantity(qty);
        Ok(level.clone())
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn cart_for_owner(&self, owner: &CartOwner) -> Result<Option<Cart>> {
        let state = self.state.read().await;
        Ok(state.carts.values().find(|c| c.owner() == owner).cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        self.state.write().await.carts.insert(cart.id(), cart.clone());
        Ok(())
    }

    async fn delete_cart(&self, id: CartId) -> Result<()> {
        self.state.write().await.carts.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl CouponStore for MemoryStore {
    async fn coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let code = code.to_uppercase();
        let state = self.state.read().await;
        Ok(state.coupons.values().find(|c| c.code() == code).cloned())
    }

    async fn put_coupon(&self, coupon: Coupon) -> Result<()> {
        self.state.write().await.coupons.insert(coupon.id(), coupon);
        Ok(())
    }

    async fn try_redeem(&self, id: CouponId) -> Result<RedeemOutcome> {
        let mut state = self.state.write().await;
        let coupon = state
            .coupons
            .get_mut(&id)
            .ok_or_else(|| not_found("coupon", id.to_string()))?;

        if let Some(limit) = coupon.usage_limit()
            && coupon.usage_count() >= limit
        {
            return Ok(RedeemOutcome::Exhausted);
        }
        coupon.record_redemption();
        Ok(RedeemOutcome::Redeemed)
    }

    async fn release_redemption(&self, id: CouponId) -> Result<()> {
        let mut state = self.state.write().await;
        let coupon = state
            .coupons
            .get_mut(&id)
            .ok_or_else(|| not_found("coupon", id.to_string()))?;
        coupon.release_redemption();
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut state = self.state.write().await;
        if state.orders.contains_key(&order.id()) {
            return Err(StoreError::Duplicate {
                entity: "order",
                id: order.id().to_string(),
            });
        }
        state.orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.orders.contains_key(&order.id()) {
            return Err(not_found("order", order.id().to_string()));
        }
        state.orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn next_order_sequence(&self, day: NaiveDate) -> Result<u32> {
        let mut state = self.state.write().await;
        let seq = state.order_seqs.entry(day).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        let mut state = self.state.write().await;
        if state.payments.contains_key(&payment.id()) {
            return Err(StoreError::Duplicate {
                entity: "payment",
                id: payment.id().to_string(),
            });
        }
        state.payments.insert(payment.id(), payment.clone());
        Ok(())
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.state.read().await.payments.get(&id).cloned())
    }

    async fn payment_by_intent(&self, intent_ref: &str) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .values()
            .find(|p| p.intent_ref() == intent_ref)
            .cloned())
    }

    async fn payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>> {
        let state = self.state.read().await;
        let mut payments: Vec<_> = state
            .payments
            .values()
            .filter(|p| p.order_id() == order_id)
            .cloned()
            .collect();
        payments.sort_by_key(Payment::created_at);
        Ok(payments)
    }

    async fn update_payment(&self, payment: &Payment) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.payments.contains_key(&payment.id()) {
            return Err(not_found("payment", payment.id().to_string()));
        }
        state.payments.insert(payment.id(), payment.clone());
        Ok(())
    }
}

fn not_found(entity: &'static str, id: String) -> StoreError {
    StoreError::NotFound { entity, id }
}
