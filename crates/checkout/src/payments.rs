//! Payment intent creation, idempotent confirmation and refunds.

use std::sync::Arc;

use common::{OrderId, PaymentId, ProductId};
use domain::{Clock, Payment, PaymentError, PaymentStatus};
use store::Stores;

use crate::error::{CheckoutError, Result};
use crate::events::{EventSink, OrderEvent};
use crate::gateway::PaymentGateway;

/// Response to an intent-creation request; the client secret goes to
/// the frontend, never the card data.
#[derive(Debug, Clone)]
pub struct IntentResponse {
    pub payment_id: PaymentId,
    pub payment_intent_id: String,
    pub client_secret: String,
}

/// Outcome reported by the processor's confirmation callback.
#[derive(Debug, Clone)]
pub enum PaymentOutcome {
    Succeeded {
        card_brand: Option<String>,
        card_last4: Option<String>,
    },
    Failed {
        reason: Option<String>,
    },
}

/// Drives payment state against orders and the inventory ledger.
///
/// Confirmation callbacks may arrive more than once or out of order;
/// handling is idempotent — a payment whose status already settled is
/// returned unchanged, with no second order transition and no second
/// stock release.
pub struct PaymentsService<S, G> {
    store: S,
    gateway: G,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
}

impl<S, G> PaymentsService<S, G>
where
    S: Stores,
    G: PaymentGateway,
{
    /// Creates a new payments service.
    pub fn new(store: S, gateway: G, clock: Arc<dyn Clock>, events: Arc<dyn EventSink>) -> Self {
        Self {
            store,
            gateway,
            clock,
            events,
        }
    }

    /// Creates a processor intent for a pending order's total and
    /// persists the pending payment record.
    ///
    /// A gateway failure here mutates nothing: the checkout
    /// reservation stays in place while the customer retries.
    #[tracing::instrument(skip(self))]
    pub async fn create_intent(&self, order_id: OrderId) -> Result<IntentResponse> {
        let order = self
            .store
            .order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;

        if order.status() != domain::OrderStatus::Pending {
            return Err(CheckoutError::PaymentNotAllowed(format!(
                "order is {}, not awaiting payment",
                order.status()
            )));
        }
        if !order.total().is_positive() {
            return Err(CheckoutError::PaymentNotAllowed(
                "order total must be positive".to_string(),
            ));
        }
        let attempts = self.store.payments_for_order(order_id).await?;
        if attempts
            .iter()
            .any(|p| p.status() == PaymentStatus::Succeeded)
        {
            return Err(CheckoutError::PaymentNotAllowed(
                "order is already paid".to_string(),
            ));
        }

        let handle = self
            .gateway
            .create_intent(order_id, order.total(), order.currency())
            .await?;

        let payment = Payment::new(
            PaymentId::new(),
            order_id,
            order.total(),
            order.currency(),
            handle.intent_id.clone(),
            self.clock.now(),
        );
        self.store.insert_payment(&payment).await?;

        metrics::counter!("payment_intents_total").increment(1);
        tracing::info!(%order_id, intent = %handle.intent_id, "payment intent created");

        Ok(IntentResponse {
            payment_id: payment.id(),
            payment_intent_id: handle.intent_id,
            client_secret: handle.client_secret,
        })
    }

    /// Applies a processor confirmation callback.
    ///
    /// Success advances the order Pending → Processing. A confirmed
    /// failure releases every reservation the checkout made for the
    /// order — the key compensating transaction — and leaves the order
    /// pending so the customer can retry or cancel.
    #[tracing::instrument(skip(self, outcome))]
    pub async fn confirm(&self, intent_ref: &str, outcome: PaymentOutcome) -> Result<Payment> {
        let mut payment = self
            .store
            .payment_by_intent(intent_ref)
            .await?
            .ok_or_else(|| CheckoutError::PaymentNotFound(intent_ref.to_string()))?;

        if !payment.status().can_confirm() {
            tracing::info!(
                intent = intent_ref,
                status = %payment.status(),
                "duplicate confirmation ignored"
            );
            return Ok(payment);
        }

        match outcome {
            PaymentOutcome::Succeeded {
                card_brand,
                card_last4,
            } => {
                payment.succeed(card_brand, card_last4, self.clock.now())?;
                self.store.update_payment(&payment).await?;

                let mut order = self
                    .store
                    .order(payment.order_id())
                    .await?
                    .ok_or(CheckoutError::OrderNotFound(payment.order_id()))?;
                if order.status().can_start_processing() {
                    order.begin_processing()?;
                    self.store.update_order(&order).await?;
                }

                metrics::counter!("payments_confirmed_total", "outcome" => "succeeded")
                    .increment(1);
                tracing::info!(intent = intent_ref, "payment succeeded");
            }
            PaymentOutcome::Failed { reason } => {
                payment.fail(reason.clone())?;
                self.store.update_payment(&payment).await?;

                // Checkout succeeded at the stock layer but payment did
                // not: give the held units back.
                let order = self
                    .store
                    .order(payment.order_id())
                    .await?
                    .ok_or(CheckoutError::OrderNotFound(payment.order_id()))?;
                self.release_order_holds(&order).await;

                self.events
                    .publish(OrderEvent::PaymentFailed {
                        order_id: order.id(),
                        payment_id: payment.id(),
                        reason,
                    })
                    .await;
                metrics::counter!("payments_confirmed_total", "outcome" => "failed").increment(1);
                tracing::warn!(intent = intent_ref, "payment failed");
            }
        }

        Ok(payment)
    }

    /// Refunds a captured payment and moves its order to refunded.
    #[tracing::instrument(skip(self))]
    pub async fn refund(&self, payment_id: PaymentId) -> Result<Payment> {
        let mut payment = self
            .store
            .payment(payment_id)
            .await?
            .ok_or_else(|| CheckoutError::PaymentNotFound(payment_id.to_string()))?;

        if !payment.status().can_refund() {
            return Err(PaymentError::InvalidStateTransition {
                current_status: payment.status(),
                action: "refund",
            }
            .into());
        }

        self.gateway.refund(payment.intent_ref()).await?;
        payment.refund()?;
        self.store.update_payment(&payment).await?;

        let mut order = self
            .store
            .order(payment.order_id())
            .await?
            .ok_or(CheckoutError::OrderNotFound(payment.order_id()))?;
        if order.status().can_refund() {
            // Pre-shipping orders still hold reservations.
            if order.status().can_be_cancelled() {
                self.release_order_holds(&order).await;
            }
            order.refund()?;
            self.store.update_order(&order).await?;
        }

        metrics::counter!("payments_refunded_total").increment(1);
        tracing::info!(%payment_id, "payment refunded");

        Ok(payment)
    }

    async fn release_order_holds(&self, order: &domain::Order) {
        let holds: Vec<(ProductId, u32)> = order
            .lines()
            .iter()
            .map(|l| (l.product_id, l.quantity))
            .collect();
        for (product_id, qty) in holds {
            if let Err(error) = self.store.release(product_id, qty).await {
                tracing::error!(%product_id, qty, %error, "failed to release reservation");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckoutConfig;
    use crate::events::InMemoryEventSink;
    use crate::gateway::InMemoryPaymentGateway;
    use crate::workflow::{OrderWorkflow, PlaceOrder};
    use chrono::Utc;
    use common::CustomerId;
    use domain::{Cart, CartOwner, FixedClock, Money, Order, OrderStatus, ProductSnapshot};
    use store::{CartStore, InventoryStore, MemoryStore, OrderStore, PaymentStore};

    struct Fixture {
        payments: PaymentsService<MemoryStore, InMemoryPaymentGateway>,
        workflow: OrderWorkflow<MemoryStore, InMemoryPaymentGateway>,
        store: MemoryStore,
        gateway: InMemoryPaymentGateway,
        sink: Arc<InMemoryEventSink>,
        clock: Arc<FixedClock>,
    }

    async fn setup() -> Fixture {
        let store = MemoryStore::new();
        let gateway = InMemoryPaymentGateway::new();
        let sink = Arc::new(InMemoryEventSink::new());
        let clock = Arc::new(FixedClock::at(Utc::now()));
        let payments = PaymentsService::new(
            store.clone(),
            gateway.clone(),
            clock.clone(),
            sink.clone(),
        );
        let workflow = OrderWorkflow::new(
            store.clone(),
            gateway.clone(),
            CheckoutConfig::default(),
            clock.clone(),
            sink.clone(),
        );
        Fixture {
            payments,
            workflow,
            store,
            gateway,
            sink,
            clock,
        }
    }

    async fn place_test_order(fx: &Fixture) -> (Order, ProductSnapshot) {
        let product = ProductSnapshot::new(
            ProductId::new(),
            "kind-of-blue",
            "Kind of Blue",
            "Miles Davis",
            "LP",
            None,
            Money::from_cents(1000),
            None,
        )
        .unwrap();
        fx.store.seed_album(product.clone(), 5).await;

        let owner = CartOwner::Customer(CustomerId::new());
        let now = fx.clock.now();
        let mut cart = match &owner {
            CartOwner::Customer(id) => Cart::for_customer(*id, now),
            CartOwner::Guest(session) => Cart::for_guest(session.clone(), now),
        };
        cart.add_item(&product, 2, now).unwrap();
        fx.store.save_cart(&cart).await.unwrap();

        let order = fx
            .workflow
            .place_order(
                &owner,
                PlaceOrder {
                    shipping_address: serde_json::json!({"line1": "1 Main St"}),
                    billing_address: None,
                    shipping_method: "pickup".to_string(),
                    customer_notes: None,
                },
            )
            .await
            .unwrap();
        (order, product)
    }

    fn succeeded() -> PaymentOutcome {
        PaymentOutcome::Succeeded {
            card_brand: Some("visa".to_string()),
            card_last4: Some("4242".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_intent_for_pending_order() {
        let fx = setup().await;
        let (order, _) = place_test_order(&fx).await;

        let response = fx.payments.create_intent(order.id()).await.unwrap();
        assert!(response.payment_intent_id.starts_with("pi_"));
        assert!(response.client_secret.contains("secret"));
        assert_eq!(fx.gateway.intent_count(), 1);

        let payment = fx
            .store
            .payment_by_intent(&response.payment_intent_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.status(), PaymentStatus::Pending);
        assert_eq!(payment.amount(), order.total());
    }

    #[tokio::test]
    async fn test_create_intent_requires_pending_order() {
        let fx = setup().await;
        let (order, _) = place_test_order(&fx).await;
        fx.workflow.cancel_order(order.id()).await.unwrap();

        let err = fx.payments.create_intent(order.id()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::PaymentNotAllowed(_)));
    }

    #[tokio::test]
    async fn test_gateway_failure_leaves_no_payment_record() {
        let fx = setup().await;
        let (order, product) = place_test_order(&fx).await;
        fx.gateway.set_fail_on_create(true);

        let err = fx.payments.create_intent(order.id()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Gateway(_)));

        // No payment row and, critically, the reservation persists.
        assert!(fx
            .store
            .payments_for_order(order.id())
            .await
            .unwrap()
            .is_empty());
        let level = fx.store.inventory(product.id).await.unwrap().unwrap();
        assert_eq!(level.reserved(), 2);
    }

    #[tokio::test]
    async fn test_confirm_success_advances_order() {
        let fx = setup().await;
        let (order, _) = place_test_order(&fx).await;
        let intent = fx.payments.create_intent(order.id()).await.unwrap();

        let payment = fx
            .payments
            .confirm(&intent.payment_intent_id, succeeded())
            .await
            .unwrap();

        assert_eq!(payment.status(), PaymentStatus::Succeeded);
        assert_eq!(payment.card_last4(), Some("4242"));
        assert!(payment.paid_at().is_some());

        let order = fx.store.order(order.id()).await.unwrap().unwrap();
        assert_eq!(order.status(), OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_confirm_is_idempotent() {
        let fx = setup().await;
        let (order, product) = place_test_order(&fx).await;
        let intent = fx.payments.create_intent(order.id()).await.unwrap();

        fx.payments
            .confirm(&intent.payment_intent_id, succeeded())
            .await
            .unwrap();
        let second = fx
            .payments
            .confirm(&intent.payment_intent_id, succeeded())
            .await
            .unwrap();

        // Second callback is a no-op, not an error.
        assert_eq!(second.status(), PaymentStatus::Succeeded);
        let order = fx.store.order(order.id()).await.unwrap().unwrap();
        assert_eq!(order.status(), OrderStatus::Processing);

        // A late contradictory callback is ignored too.
        let ignored = fx
            .payments
            .confirm(
                &intent.payment_intent_id,
                PaymentOutcome::Failed { reason: None },
            )
            .await
            .unwrap();
        assert_eq!(ignored.status(), PaymentStatus::Succeeded);
        let level = fx.store.inventory(product.id).await.unwrap().unwrap();
        assert_eq!(level.reserved(), 2);
    }

    #[tokio::test]
    async fn test_confirmed_failure_releases_reservations() {
        let fx = setup().await;
        let (order, product) = place_test_order(&fx).await;
        let intent = fx.payments.create_intent(order.id()).await.unwrap();

        let payment = fx
            .payments
            .confirm(
                &intent.payment_intent_id,
                PaymentOutcome::Failed {
                    reason: Some("card_declined".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(payment.status(), PaymentStatus::Failed);
        assert_eq!(payment.failure_reason(), Some("card_declined"));

        // The compensating transaction: held stock is released, the
        // order stays pending for a retry.
        let level = fx.store.inventory(product.id).await.unwrap().unwrap();
        assert_eq!(level.reserved(), 0);
        let order = fx.store.order(order.id()).await.unwrap().unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);

        assert!(matches!(
            fx.sink.events().last(),
            Some(OrderEvent::PaymentFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_repeated_failure_does_not_double_release() {
        let fx = setup().await;
        let (_order, product) = place_test_order(&fx).await;
        let intent = fx.payments.create_intent(_order.id()).await.unwrap();

        // Reserve a second batch so a double release would be visible.
        fx.store.try_reserve(product.id, 1).await.unwrap();

        fx.payments
            .confirm(
                &intent.payment_intent_id,
                PaymentOutcome::Failed { reason: None },
            )
            .await
            .unwrap();
        fx.payments
            .confirm(
                &intent.payment_intent_id,
                PaymentOutcome::Failed { reason: None },
            )
            .await
            .unwrap();

        let level = fx.store.inventory(product.id).await.unwrap().unwrap();
        // Only the order's own two units were released, exactly once.
        assert_eq!(level.reserved(), 1);
    }

    #[tokio::test]
    async fn test_retry_after_failure_creates_new_intent() {
        let fx = setup().await;
        let (order, _) = place_test_order(&fx).await;
        let first = fx.payments.create_intent(order.id()).await.unwrap();
        fx.payments
            .confirm(
                &first.payment_intent_id,
                PaymentOutcome::Failed { reason: None },
            )
            .await
            .unwrap();

        let second = fx.payments.create_intent(order.id()).await.unwrap();
        assert_ne!(first.payment_intent_id, second.payment_intent_id);
        assert_eq!(
            fx.store
                .payments_for_order(order.id())
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_refund_requires_captured_payment() {
        let fx = setup().await;
        let (order, _) = place_test_order(&fx).await;
        let intent = fx.payments.create_intent(order.id()).await.unwrap();
        let payment = fx
            .store
            .payment_by_intent(&intent.payment_intent_id)
            .await
            .unwrap()
            .unwrap();

        let err = fx.payments.refund(payment.id()).await.unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Payment(PaymentError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_refund_moves_order_to_refunded() {
        let fx = setup().await;
        let (order, product) = place_test_order(&fx).await;
        let intent = fx.payments.create_intent(order.id()).await.unwrap();
        let payment = fx
            .payments
            .confirm(&intent.payment_intent_id, succeeded())
            .await
            .unwrap();

        let refunded = fx.payments.refund(payment.id()).await.unwrap();
        assert_eq!(refunded.status(), PaymentStatus::Refunded);
        assert_eq!(fx.gateway.refund_count(), 1);

        let order = fx.store.order(order.id()).await.unwrap().unwrap();
        assert_eq!(order.status(), OrderStatus::Refunded);

        // The processing order still held its reservation; it was
        // released with the refund.
        let level = fx.store.inventory(product.id).await.unwrap().unwrap();
        assert_eq!(level.reserved(), 0);
    }

    #[tokio::test]
    async fn test_confirm_unknown_intent() {
        let fx = setup().await;
        let result = fx.payments.confirm("pi_9999", succeeded()).await;
        assert!(matches!(result, Err(CheckoutError::PaymentNotFound(_))));
    }
}
