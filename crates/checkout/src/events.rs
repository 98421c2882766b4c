//! Post-commit order events.
//!
//! The workflow publishes these after a successful store commit; the
//! sink decides what delivery means (email, queue, log). Keeping the
//! side effects behind an explicit port makes their ordering and
//! failure handling visible instead of hiding them in model lifecycle
//! hooks.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{OrderId, PaymentId};
use domain::Money;
use serde::Serialize;

/// Events emitted by the order workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    /// An order was created from a cart.
    OrderCreated {
        order_id: OrderId,
        order_number: String,
        total: Money,
    },

    /// An order was handed to the carrier.
    OrderShipped {
        order_id: OrderId,
        order_number: String,
    },

    /// An order was cancelled; `refunded` is true when a captured
    /// payment was returned as part of the cancellation.
    OrderCancelled { order_id: OrderId, refunded: bool },

    /// The processor confirmed a payment failure.
    PaymentFailed {
        order_id: OrderId,
        payment_id: PaymentId,
        reason: Option<String>,
    },
}

impl OrderEvent {
    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated { .. } => "order_created",
            OrderEvent::OrderShipped { .. } => "order_shipped",
            OrderEvent::OrderCancelled { .. } => "order_cancelled",
            OrderEvent::PaymentFailed { .. } => "payment_failed",
        }
    }
}

/// Destination for post-commit events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers one event. Delivery is best-effort; the workflow never
    /// rolls back a committed order because a notification failed.
    async fn publish(&self, event: OrderEvent);
}

/// Sink that records events in memory, for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventSink {
    events: Arc<RwLock<Vec<OrderEvent>>>,
}

impl InMemoryEventSink {
    /// Creates a new empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded events in publish order.
    pub fn events(&self) -> Vec<OrderEvent> {
        self.events.read().unwrap().clone()
    }

    /// Returns the number of recorded events.
    pub fn event_count(&self) -> usize {
        self.events.read().unwrap().len()
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn publish(&self, event: OrderEvent) {
        self.events.write().unwrap().push(event);
    }
}

/// Sink that logs events through `tracing`, the default for the
/// server binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, event: OrderEvent) {
        tracing::info!(event = event.event_type(), ?event, "order event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_sink_records_in_order() {
        let sink = InMemoryEventSink::new();
        let order_id = OrderId::new();

        sink.publish(OrderEvent::OrderCreated {
            order_id,
            order_number: "REC-20260806-0001".to_string(),
            total: Money::from_cents(1800),
        })
        .await;
        sink.publish(OrderEvent::OrderCancelled {
            order_id,
            refunded: false,
        })
        .await;

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type(), "order_created");
        assert_eq!(events[1].event_type(), "order_cancelled");
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = OrderEvent::PaymentFailed {
            order_id: OrderId::new(),
            payment_id: PaymentId::new(),
            reason: Some("card_declined".to_string()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "payment_failed");
        assert_eq!(json["reason"], "card_declined");
    }
}
