//! Payment gateway port and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderId;
use domain::Money;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the payment processor.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The processor rejected the request.
    #[error("Payment processor rejected the request: {0}")]
    Rejected(String),

    /// The processor could not be reached.
    #[error("Payment processor unavailable: {0}")]
    Unavailable(String),
}

/// A created payment intent: the processor's reference plus the
/// client secret handed to the frontend for confirmation.
#[derive(Debug, Clone)]
pub struct IntentHandle {
    pub intent_id: String,
    pub client_secret: String,
}

/// Trait for the card processor integration.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a processor-side payment intent for an order total.
    async fn create_intent(
        &self,
        order_id: OrderId,
        amount: Money,
        currency: &str,
    ) -> Result<IntentHandle, GatewayError>;

    /// Requests a refund of a captured intent.
    async fn refund(&self, intent_ref: &str) -> Result<(), GatewayError>;
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    intents: HashMap<String, (OrderId, i64)>,
    refunded: Vec<String>,
    next_id: u32,
    fail_on_create: bool,
    fail_on_refund: bool,
}

/// In-memory payment gateway for testing and the default server.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to fail intent creation.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Configures the gateway to fail refunds.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state.write().unwrap().fail_on_refund = fail;
    }

    /// Returns the number of created intents.
    pub fn intent_count(&self) -> usize {
        self.state.read().unwrap().intents.len()
    }

    /// Returns true if an intent exists with the given ID.
    pub fn has_intent(&self, intent_id: &str) -> bool {
        self.state.read().unwrap().intents.contains_key(intent_id)
    }

    /// Returns the number of refunds performed.
    pub fn refund_count(&self) -> usize {
        self.state.read().unwrap().refunded.len()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_intent(
        &self,
        order_id: OrderId,
        amount: Money,
        _currency: &str,
    ) -> Result<IntentHandle, GatewayError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_create {
            return Err(GatewayError::Rejected("intent creation failed".to_string()));
        }

        state.next_id += 1;
        let intent_id = format!("pi_{:04}", state.next_id);
        state
            .intents
            .insert(intent_id.clone(), (order_id, amount.cents()));

        Ok(IntentHandle {
            client_secret: format!("{intent_id}_secret_{}", Uuid::new_v4().simple()),
            intent_id,
        })
    }

    async fn refund(&self, intent_ref: &str) -> Result<(), GatewayError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_refund {
            return Err(GatewayError::Unavailable("refund failed".to_string()));
        }

        if !state.intents.contains_key(intent_ref) {
            return Err(GatewayError::Rejected(format!(
                "unknown intent: {intent_ref}"
            )));
        }

        state.refunded.push(intent_ref.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_intent_and_refund() {
        let gateway = InMemoryPaymentGateway::new();
        let order_id = OrderId::new();

        let handle = gateway
            .create_intent(order_id, Money::from_cents(1800), "USD")
            .await
            .unwrap();
        assert!(handle.intent_id.starts_with("pi_"));
        assert!(handle.client_secret.starts_with(&handle.intent_id));
        assert_eq!(gateway.intent_count(), 1);
        assert!(gateway.has_intent(&handle.intent_id));

        gateway.refund(&handle.intent_id).await.unwrap();
        assert_eq!(gateway.refund_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_on_create() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.set_fail_on_create(true);

        let result = gateway
            .create_intent(OrderId::new(), Money::from_cents(1000), "USD")
            .await;
        assert!(result.is_err());
        assert_eq!(gateway.intent_count(), 0);
    }

    #[tokio::test]
    async fn test_refund_unknown_intent_rejected() {
        let gateway = InMemoryPaymentGateway::new();
        assert!(gateway.refund("pi_9999").await.is_err());
    }

    #[tokio::test]
    async fn test_sequential_intent_ids() {
        let gateway = InMemoryPaymentGateway::new();
        let order_id = OrderId::new();

        let h1 = gateway
            .create_intent(order_id, Money::from_cents(1000), "USD")
            .await
            .unwrap();
        let h2 = gateway
            .create_intent(order_id, Money::from_cents(1000), "USD")
            .await
            .unwrap();

        assert_eq!(h1.intent_id, "pi_0001");
        assert_eq!(h2.intent_id, "pi_0002");
    }
}
