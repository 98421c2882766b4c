//! Order workflow: checkout, cancellation and fulfillment transitions.

use std::sync::Arc;

use common::{CouponId, OrderId, ProductId};
use domain::{
    CartOwner, Clock, Coupon, CouponError, Money, Order, OrderDraft, OrderError, OrderLine,
    OrderStatus, PaymentStatus, format_order_number,
};
use store::{DeductOutcome, RedeemOutcome, ReserveOutcome, Stores};

use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, Result};
use crate::events::{EventSink, OrderEvent};
use crate::gateway::PaymentGateway;

/// Checkout request payload.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub shipping_address: serde_json::Value,
    /// Defaults to the shipping address when absent.
    pub billing_address: Option<serde_json::Value>,
    pub shipping_method: String,
    pub customer_notes: Option<String>,
}

/// Orchestrates the cart-to-order transaction and the order's
/// status transitions.
///
/// Every path that fails after placing a reservation compensates
/// (releases the holds, reverses the coupon redemption) before the
/// error surfaces, so a failed checkout leaves the ledger and the
/// cart exactly as it found them.
pub struct OrderWorkflow<S, G> {
    store: S,
    gateway: G,
    config: CheckoutConfig,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
}

impl<S, G> OrderWorkflow<S, G>
where
    S: Stores,
    G: PaymentGateway,
{
    /// Creates a new workflow.
    pub fn new(
        store: S,
        gateway: G,
        config: CheckoutConfig,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
            clock,
            events,
        }
    }

    /// Returns the workflow configuration.
    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Converts the owner's cart into a pending order.
    ///
    /// The critical sequence: validate the cart, reserve every line
    /// (all-or-nothing), re-validate and redeem the coupon, price the
    /// order, allocate the daily order number, persist, clear the
    /// cart. See the crate docs for the compensation rules.
    #[tracing::instrument(skip(self, owner, request), fields(owner = %owner))]
    pub async fn place_order(&self, owner: &CartOwner, request: PlaceOrder) -> Result<Order> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let started = std::time::Instant::now();
        let now = self.clock.now();

        let cart = self
            .store
            .cart_for_owner(owner)
            .await?
            .ok_or(CheckoutError::CartEmpty)?;
        if cart.is_empty() || cart.is_expired(now) {
            return Err(CheckoutError::CartEmpty);
        }

        let method = self
            .config
            .shipping_method(&request.shipping_method)
            .ok_or_else(|| CheckoutError::UnknownShippingMethod(request.shipping_method.clone()))?
            .clone();

        // All-or-nothing reservation across the whole cart.
        let mut reserved: Vec<(ProductId, u32)> = Vec::with_capacity(cart.lines().len());
        for line in cart.lines() {
            match self.store.try_reserve(line.product_id, line.quantity).await {
                Ok(ReserveOutcome::Reserved) => reserved.push((line.product_id, line.quantity)),
                Ok(ReserveOutcome::Insufficient { available }) => {
                    self.release_holds(&reserved).await;
                    metrics::counter!("checkout_failures_total", "reason" => "insufficient_stock")
                        .increment(1);
                    return Err(CheckoutError::InsufficientStock {
                        product_id: line.product_id,
                        requested: line.quantity,
                        available,
                    });
                }
                Err(e) => {
                    self.release_holds(&reserved).await;
                    return Err(e.into());
                }
            }
        }

        // Re-validate the coupon against the fresh subtotal and redeem
        // it atomically; the cart-view validation may be stale.
        let subtotal = cart.subtotal();
        let mut redeemed: Option<CouponId> = None;
        let discount = match cart.coupon_code() {
            Some(code) => match self.redeem_coupon(code, subtotal, now).await {
                Ok(coupon) => {
                    redeemed = Some(coupon.id());
                    coupon.discount_for(subtotal, now)
                }
                Err(e) => {
                    self.release_holds(&reserved).await;
                    metrics::counter!("checkout_failures_total", "reason" => "coupon").increment(1);
                    return Err(e);
                }
            },
            None => Money::zero(),
        };

        // Snapshot lines, denormalizing current catalog fields.
        let mut lines = Vec::with_capacity(cart.lines().len());
        for cart_line in cart.lines() {
            let product = match self.store.product(cart_line.product_id).await {
                Ok(Some(product)) => product,
                Ok(None) => {
                    self.compensate(&reserved, redeemed).await;
                    return Err(CheckoutError::ProductNotFound(cart_line.product_id));
                }
                Err(e) => {
                    self.compensate(&reserved, redeemed).await;
                    return Err(e.into());
                }
            };
            lines.push(OrderLine::new(
                cart_line.product_id,
                product.title,
                product.artist,
                product.format,
                product.cover_image,
                cart_line.quantity,
                cart_line.unit_price,
            ));
        }

        let day = now.date_naive();
        let seq = match self.store.next_order_sequence(day).await {
            Ok(seq) => seq,
            Err(e) => {
                self.compensate(&reserved, redeemed).await;
                return Err(e.into());
            }
        };

        let draft = OrderDraft {
            id: OrderId::new(),
            order_number: format_order_number(&self.config.order_number_prefix, day, seq),
            placed_by: owner.clone(),
            lines,
            coupon_code: cart.coupon_code().map(String::from),
            discount_amount: discount,
            shipping_amount: method.price,
            tax_amount: subtotal.basis_points(self.config.tax_rate_bps),
            shipping_method: method.code,
            shipping_address: request.shipping_address.clone(),
            billing_address: request
                .billing_address
                .unwrap_or_else(|| request.shipping_address.clone()),
            customer_notes: request.customer_notes,
            currency: self.config.currency.clone(),
        };

        let order = match Order::place(draft, now) {
            Ok(order) => order,
            Err(e) => {
                self.compensate(&reserved, redeemed).await;
                return Err(e.into());
            }
        };

        if let Err(e) = self.store.insert_order(&order).await {
            self.compensate(&reserved, redeemed).await;
            return Err(e.into());
        }

        // The order is committed; a failed cart delete leaves stock
        // and money consistent, so log and carry on.
        if let Err(error) = self.store.delete_cart(cart.id()).await {
            tracing::warn!(cart_id = %cart.id(), %error, "failed to clear cart after checkout");
        }

        self.events
            .publish(OrderEvent::OrderCreated {
                order_id: order.id(),
                order_number: order.order_number().to_string(),
                total: order.total(),
            })
            .await;

        metrics::counter!("checkout_completed_total").increment(1);
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            order_id = %order.id(),
            order_number = order.order_number(),
            total = %order.total(),
            "order placed"
        );

        Ok(order)
    }

    /// Cancels an order, releasing its reservations.
    ///
    /// A captured payment is refunded as the cancellation's
    /// compensating action, in which case the order ends `Refunded`
    /// rather than `Cancelled`.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order> {
        let mut order = self
            .store
            .order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;

        if !order.can_be_cancelled() {
            return Err(OrderError::InvalidStateTransition {
                current_status: order.status(),
                action: "cancel",
            }
            .into());
        }

        // Refund first: it is the step that can fail, and it performs
        // no local mutation until the gateway accepts.
        let captured = self
            .store
            .payments_for_order(order_id)
            .await?
            .into_iter()
            .find(|p| p.status() == PaymentStatus::Succeeded);

        let refunded = match captured {
            Some(mut payment) => {
                self.gateway.refund(payment.intent_ref()).await?;
                payment.refund()?;
                self.store.update_payment(&payment).await?;
                order.refund()?;
                true
            }
            None => {
                order.cancel()?;
                false
            }
        };

        let holds: Vec<(ProductId, u32)> = order
            .lines()
            .iter()
            .map(|l| (l.product_id, l.quantity))
            .collect();
        self.release_holds(&holds).await;

        self.store.update_order(&order).await?;

        self.events
            .publish(OrderEvent::OrderCancelled {
                order_id,
                refunded,
            })
            .await;
        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(%order_id, refunded, "order cancelled");

        Ok(order)
    }

    /// Ships a processing order: converts every line's hold into a
    /// permanent deduction and stamps `shipped_at`.
    #[tracing::instrument(skip(self))]
    pub async fn ship_order(&self, order_id: OrderId) -> Result<Order> {
        let mut order = self
            .store
            .order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;

        if !order.status().can_ship() {
            return Err(OrderError::InvalidStateTransition {
                current_status: order.status(),
                action: "ship",
            }
            .into());
        }

        // Deduct all-or-nothing, restoring holds if a later line
        // falls short.
        let mut deducted: Vec<(ProductId, u32)> = Vec::with_capacity(order.lines().len());
        for line in order.lines() {
            match self.store.try_deduct(line.product_id, line.quantity).await {
                Ok(DeductOutcome::Deducted) => deducted.push((line.product_id, line.quantity)),
                Ok(DeductOutcome::Insufficient { on_hand }) => {
                    self.restore_deductions(&deducted).await;
                    return Err(CheckoutError::InsufficientStock {
                        product_id: line.product_id,
                        requested: line.quantity,
                        available: on_hand,
                    });
                }
                Err(e) => {
                    self.restore_deductions(&deducted).await;
                    return Err(e.into());
                }
            }
        }

        order.ship(self.clock.now())?;
        self.store.update_order(&order).await?;

        self.events
            .publish(OrderEvent::OrderShipped {
                order_id,
                order_number: order.order_number().to_string(),
            })
            .await;
        tracing::info!(%order_id, "order shipped");

        Ok(order)
    }

    /// Marks a shipped order delivered, stamping `delivered_at`.
    #[tracing::instrument(skip(self))]
    pub async fn mark_delivered(&self, order_id: OrderId) -> Result<Order> {
        let mut order = self
            .store
            .order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;

        order.deliver(self.clock.now())?;
        self.store.update_order(&order).await?;
        tracing::info!(%order_id, "order delivered");

        Ok(order)
    }

    /// Refunds an order administratively from any non-terminal status.
    #[tracing::instrument(skip(self))]
    pub async fn refund_order(&self, order_id: OrderId) -> Result<Order> {
        let mut order = self
            .store
            .order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;

        if !order.status().can_refund() {
            return Err(OrderError::InvalidStateTransition {
                current_status: order.status(),
                action: "refund",
            }
            .into());
        }

        if let Some(mut payment) = self
            .store
            .payments_for_order(order_id)
            .await?
            .into_iter()
            .find(|p| p.status() == PaymentStatus::Succeeded)
        {
            self.gateway.refund(payment.intent_ref()).await?;
            payment.refund()?;
            self.store.update_payment(&payment).await?;
        }

        // Holds only exist before shipping; after that the stock is
        // already deducted.
        if order.status().can_be_cancelled() {
            let holds: Vec<(ProductId, u32)> = order
                .lines()
                .iter()
                .map(|l| (l.product_id, l.quantity))
                .collect();
            self.release_holds(&holds).await;
        }

        order.refund()?;
        self.store.update_order(&order).await?;
        tracing::info!(%order_id, "order refunded");

        Ok(order)
    }

    /// Admin driver: dispatches a target status to the matching
    /// transition.
    pub async fn set_status(&self, order_id: OrderId, target: OrderStatus) -> Result<Order> {
        match target {
            OrderStatus::Pending => {
                let order = self
                    .store
                    .order(order_id)
                    .await?
                    .ok_or(CheckoutError::OrderNotFound(order_id))?;
                Err(OrderError::InvalidStateTransition {
                    current_status: order.status(),
                    action: "revert to pending",
                }
                .into())
            }
            OrderStatus::Processing => {
                let mut order = self
                    .store
                    .order(order_id)
                    .await?
                    .ok_or(CheckoutError::OrderNotFound(order_id))?;
                order.begin_processing()?;
                self.store.update_order(&order).await?;
                Ok(order)
            }
            OrderStatus::Shipped => self.ship_order(order_id).await,
            OrderStatus::Delivered => self.mark_delivered(order_id).await,
            OrderStatus::Cancelled => self.cancel_order(order_id).await,
            OrderStatus::Refunded => self.refund_order(order_id).await,
        }
    }

    async fn redeem_coupon(
        &self,
        code: &str,
        subtotal: Money,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Coupon> {
        let coupon = self
            .store
            .coupon_by_code(code)
            .await?
            .ok_or_else(|| CouponError::UnknownCode {
                code: code.to_string(),
            })?;

        coupon.check_applicable(subtotal, now)?;

        match self.store.try_redeem(coupon.id()).await? {
            RedeemOutcome::Redeemed => Ok(coupon),
            RedeemOutcome::Exhausted => Err(CouponError::UsageLimitReached.into()),
        }
    }

    /// Releases the listed holds. Compensation is best-effort: a
    /// release failure is logged, never surfaced over the original
    /// error.
    async fn release_holds(&self, holds: &[(ProductId, u32)]) {
        for (product_id, qty) in holds {
            if let Err(error) = self.store.release(*product_id, *qty).await {
                tracing::error!(%product_id, qty, %error, "failed to release reservation");
            }
        }
    }

    async fn compensate(&self, holds: &[(ProductId, u32)], coupon: Option<CouponId>) {
        self.release_holds(holds).await;
        if let Some(id) = coupon
            && let Err(error) = self.store.release_redemption(id).await
        {
            tracing::error!(coupon_id = %id, %error, "failed to reverse coupon redemption");
        }
    }

    /// Puts deducted stock back and re-reserves it after a partial
    /// shipping failure.
    async fn restore_deductions(&self, deducted: &[(ProductId, u32)]) {
        for (product_id, qty) in deducted {
            if let Err(error) = self.store.add_stock(*product_id, *qty).await {
                tracing::error!(%product_id, qty, %error, "failed to restore deducted stock");
                continue;
            }
            if let Err(error) = self.store.try_reserve(*product_id, *qty).await {
                tracing::error!(%product_id, qty, %error, "failed to re-reserve restored stock");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::InMemoryEventSink;
    use crate::gateway::InMemoryPaymentGateway;
    use chrono::Utc;
    use common::{CouponId, CustomerId};
    use domain::{Cart, CouponKind, FixedClock, ProductSnapshot};
    use store::{CartStore, CouponStore, InventoryStore, MemoryStore, PaymentStore};

    fn album(title: &str, cents: i64) -> ProductSnapshot {
        ProductSnapshot::new(
            ProductId::new(),
            title.to_lowercase().replace(' ', "-"),
            title,
            "Test Artist",
            "LP",
            None,
            Money::from_cents(cents),
            None,
        )
        .unwrap()
    }

    struct Fixture {
        workflow: OrderWorkflow<MemoryStore, InMemoryPaymentGateway>,
        store: MemoryStore,
        gateway: InMemoryPaymentGateway,
        sink: Arc<InMemoryEventSink>,
        clock: Arc<FixedClock>,
        owner: CartOwner,
    }

    async fn setup() -> Fixture {
        let store = MemoryStore::new();
        let gateway = InMemoryPaymentGateway::new();
        let sink = Arc::new(InMemoryEventSink::new());
        let clock = Arc::new(FixedClock::at(Utc::now()));
        let workflow = OrderWorkflow::new(
            store.clone(),
            gateway.clone(),
            CheckoutConfig::default(),
            clock.clone(),
            sink.clone(),
        );
        Fixture {
            workflow,
            store,
            gateway,
            sink,
            clock,
            owner: CartOwner::Customer(CustomerId::new()),
        }
    }

    async fn seed_cart(fx: &Fixture, entries: &[(&ProductSnapshot, u32, u32)]) {
        // entries: (product, stock, cart quantity)
        let now = fx.clock.now();
        let mut cart = match &fx.owner {
            CartOwner::Customer(id) => Cart::for_customer(*id, now),
            CartOwner::Guest(session) => Cart::for_guest(session.clone(), now),
        };
        for (product, stock, qty) in entries {
            fx.store.seed_album((*product).clone(), *stock).await;
            cart.add_item(product, *qty, now).unwrap();
        }
        fx.store.save_cart(&cart).await.unwrap();
    }

    fn standard_request() -> PlaceOrder {
        PlaceOrder {
            shipping_address: serde_json::json!({"line1": "1 Main St", "city": "Portland"}),
            billing_address: None,
            shipping_method: "pickup".to_string(),
            customer_notes: None,
        }
    }

    #[tokio::test]
    async fn test_place_order_happy_path() {
        let fx = setup().await;
        let product = album("Kind of Blue", 1000);
        seed_cart(&fx, &[(&product, 5, 2)]).await;

        let order = fx
            .workflow
            .place_order(&fx.owner, standard_request())
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.subtotal().cents(), 2000);
        // pickup shipping is free; default tax is 8.75% of subtotal
        assert_eq!(order.tax_amount().cents(), 175);
        assert_eq!(order.total().cents(), 2175);
        assert!(order.order_number().starts_with("REC-"));
        assert!(order.order_number().ends_with("-0001"));

        // Stock is held, the cart is gone, the event was published.
        let level = fx.store.inventory(product.id).await.unwrap().unwrap();
        assert_eq!(level.reserved(), 2);
        assert_eq!(level.quantity(), 5);
        assert!(fx.store.cart_for_owner(&fx.owner).await.unwrap().is_none());
        assert_eq!(fx.sink.events()[0].event_type(), "order_created");
    }

    #[tokio::test]
    async fn test_place_order_billing_defaults_to_shipping() {
        let fx = setup().await;
        let product = album("Horses", 1999);
        seed_cart(&fx, &[(&product, 3, 1)]).await;

        let order = fx
            .workflow
            .place_order(&fx.owner, standard_request())
            .await
            .unwrap();
        assert_eq!(order.billing_address(), order.shipping_address());
    }

    #[tokio::test]
    async fn test_empty_cart_rejected_before_side_effects() {
        let fx = setup().await;
        let result = fx.workflow.place_order(&fx.owner, standard_request()).await;
        assert!(matches!(result, Err(CheckoutError::CartEmpty)));
    }

    #[tokio::test]
    async fn test_insufficient_stock_names_the_offender() {
        let fx = setup().await;
        let product = album("Kind of Blue", 1000);
        seed_cart(&fx, &[(&product, 1, 2)]).await;

        let err = fx
            .workflow
            .place_order(&fx.owner, standard_request())
            .await
            .unwrap_err();

        match err {
            CheckoutError::InsufficientStock {
                product_id,
                requested,
                available,
            } => {
                assert_eq!(product_id, product.id);
                assert_eq!(requested, 2);
                assert_eq!(available, 1);
            }
            other => panic!("unexpected error: {other}"),
        }

        // Ledger untouched, cart still populated for retry.
        let level = fx.store.inventory(product.id).await.unwrap().unwrap();
        assert_eq!(level.reserved(), 0);
        assert!(fx.store.cart_for_owner(&fx.owner).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_partial_reservation_is_rolled_back() {
        let fx = setup().await;
        let in_stock = album("Kind of Blue", 1000);
        let scarce = album("Blue Train", 1500);
        seed_cart(&fx, &[(&in_stock, 10, 2), (&scarce, 1, 3)]).await;

        let err = fx
            .workflow
            .place_order(&fx.owner, standard_request())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InsufficientStock { .. }));

        // The first line's successful hold was released.
        let level = fx.store.inventory(in_stock.id).await.unwrap().unwrap();
        assert_eq!(level.reserved(), 0);
    }

    #[tokio::test]
    async fn test_expired_coupon_at_checkout_releases_stock() {
        let fx = setup().await;
        let product = album("Kind of Blue", 1000);
        seed_cart(&fx, &[(&product, 5, 2)]).await;

        let now = fx.clock.now();
        let coupon = Coupon::new(CouponId::new(), "TEN", CouponKind::Percentage, 10)
            .with_window(None, Some(now + chrono::Duration::hours(1)));
        fx.store.put_coupon(coupon.clone()).await.unwrap();

        let mut cart = fx.store.cart_for_owner(&fx.owner).await.unwrap().unwrap();
        cart.apply_coupon(&coupon, now).unwrap();
        fx.store.save_cart(&cart).await.unwrap();

        // The coupon expires between cart view and checkout.
        fx.clock.advance(chrono::Duration::hours(2));

        let err = fx
            .workflow
            .place_order(&fx.owner, standard_request())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::CouponRejected(CouponError::Expired)
        ));

        let level = fx.store.inventory(product.id).await.unwrap().unwrap();
        assert_eq!(level.reserved(), 0);
        let stored = fx.store.coupon_by_code("TEN").await.unwrap().unwrap();
        assert_eq!(stored.usage_count(), 0);
    }

    #[tokio::test]
    async fn test_coupon_redeemed_exactly_once() {
        let fx = setup().await;
        let product = album("Kind of Blue", 1000);
        seed_cart(&fx, &[(&product, 5, 2)]).await;

        let now = fx.clock.now();
        let coupon = Coupon::new(CouponId::new(), "TEN", CouponKind::Percentage, 10);
        fx.store.put_coupon(coupon.clone()).await.unwrap();

        let mut cart = fx.store.cart_for_owner(&fx.owner).await.unwrap().unwrap();
        cart.apply_coupon(&coupon, now).unwrap();
        fx.store.save_cart(&cart).await.unwrap();

        let order = fx
            .workflow
            .place_order(&fx.owner, standard_request())
            .await
            .unwrap();
        assert_eq!(order.discount_amount().cents(), 200);
        assert_eq!(order.coupon_code(), Some("TEN"));

        let stored = fx.store.coupon_by_code("TEN").await.unwrap().unwrap();
        assert_eq!(stored.usage_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_shipping_method() {
        let fx = setup().await;
        let product = album("Kind of Blue", 1000);
        seed_cart(&fx, &[(&product, 5, 1)]).await;

        let mut request = standard_request();
        request.shipping_method = "drone".to_string();

        let err = fx
            .workflow
            .place_order(&fx.owner, request)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::UnknownShippingMethod(_)));

        let level = fx.store.inventory(product.id).await.unwrap().unwrap();
        assert_eq!(level.reserved(), 0);
    }

    #[tokio::test]
    async fn test_order_numbers_increment_within_a_day() {
        let fx = setup().await;
        let product = album("Kind of Blue", 1000);

        for expected in ["-0001", "-0002", "-0003"] {
            seed_cart(&fx, &[(&product, 100, 1)]).await;
            let order = fx
                .workflow
                .place_order(&fx.owner, standard_request())
                .await
                .unwrap();
            assert!(order.order_number().ends_with(expected));
        }
    }

    #[tokio::test]
    async fn test_cancel_pending_order_releases_stock() {
        let fx = setup().await;
        let product = album("Kind of Blue", 1000);
        seed_cart(&fx, &[(&product, 5, 2)]).await;

        let order = fx
            .workflow
            .place_order(&fx.owner, standard_request())
            .await
            .unwrap();
        let cancelled = fx.workflow.cancel_order(order.id()).await.unwrap();

        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        let level = fx.store.inventory(product.id).await.unwrap().unwrap();
        assert_eq!(level.reserved(), 0);
        assert_eq!(level.quantity(), 5);

        let events = fx.sink.events();
        assert!(matches!(
            events.last(),
            Some(OrderEvent::OrderCancelled { refunded: false, .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_paid_order_refunds() {
        let fx = setup().await;
        let product = album("Kind of Blue", 1000);
        seed_cart(&fx, &[(&product, 5, 2)]).await;

        let order = fx
            .workflow
            .place_order(&fx.owner, standard_request())
            .await
            .unwrap();

        // Capture a payment against the order.
        let handle = fx
            .gateway
            .create_intent(order.id(), order.total(), "USD")
            .await
            .unwrap();
        let mut payment = domain::Payment::new(
            common::PaymentId::new(),
            order.id(),
            order.total(),
            "USD",
            handle.intent_id,
            fx.clock.now(),
        );
        payment
            .succeed(Some("visa".into()), Some("4242".into()), fx.clock.now())
            .unwrap();
        fx.store.insert_payment(&payment).await.unwrap();

        let cancelled = fx.workflow.cancel_order(order.id()).await.unwrap();

        assert_eq!(cancelled.status(), OrderStatus::Refunded);
        assert_eq!(fx.gateway.refund_count(), 1);
        let stored = fx.store.payment(payment.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), PaymentStatus::Refunded);

        let level = fx.store.inventory(product.id).await.unwrap().unwrap();
        assert_eq!(level.reserved(), 0);
    }

    #[tokio::test]
    async fn test_ship_deducts_stock_and_stamps_timestamp() {
        let fx = setup().await;
        let product = album("Kind of Blue", 1000);
        seed_cart(&fx, &[(&product, 5, 2)]).await;

        let order = fx
            .workflow
            .place_order(&fx.owner, standard_request())
            .await
            .unwrap();
        fx.workflow
            .set_status(order.id(), OrderStatus::Processing)
            .await
            .unwrap();

        let shipped = fx.workflow.ship_order(order.id()).await.unwrap();
        assert_eq!(shipped.status(), OrderStatus::Shipped);
        assert!(shipped.shipped_at().is_some());

        let level = fx.store.inventory(product.id).await.unwrap().unwrap();
        assert_eq!(level.quantity(), 3);
        assert_eq!(level.reserved(), 0);

        let delivered = fx.workflow.mark_delivered(order.id()).await.unwrap();
        assert_eq!(delivered.status(), OrderStatus::Delivered);
        assert!(delivered.delivered_at().is_some());
    }

    #[tokio::test]
    async fn test_ship_requires_processing() {
        let fx = setup().await;
        let product = album("Kind of Blue", 1000);
        seed_cart(&fx, &[(&product, 5, 2)]).await;

        let order = fx
            .workflow
            .place_order(&fx.owner, standard_request())
            .await
            .unwrap();

        let err = fx.workflow.ship_order(order.id()).await.unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Order(OrderError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_order_cannot_progress() {
        let fx = setup().await;
        let product = album("Kind of Blue", 1000);
        seed_cart(&fx, &[(&product, 5, 2)]).await;

        let order = fx
            .workflow
            .place_order(&fx.owner, standard_request())
            .await
            .unwrap();
        fx.workflow.cancel_order(order.id()).await.unwrap();

        assert!(fx.workflow.ship_order(order.id()).await.is_err());
        assert!(fx.workflow.mark_delivered(order.id()).await.is_err());
        assert!(fx.workflow.cancel_order(order.id()).await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_unknown_order() {
        let fx = setup().await;
        let result = fx.workflow.cancel_order(OrderId::new()).await;
        assert!(matches!(result, Err(CheckoutError::OrderNotFound(_))));
    }
}
