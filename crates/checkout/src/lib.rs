//! Order fulfillment workflow for the record store.
//!
//! This crate orchestrates the checkout transaction and its
//! compensation paths:
//! 1. Reserve inventory for every cart line (all-or-nothing).
//! 2. Re-validate and atomically redeem an attached coupon.
//! 3. Snapshot the cart into an immutable order with a daily
//!    sequential order number.
//! 4. Drive payment capture through the gateway port, releasing the
//!    reservations when the processor confirms a failure.
//!
//! Any failure after a reservation is compensated inside the same
//! operation before the error surfaces.

pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod payments;
pub mod workflow;

pub use config::{CheckoutConfig, ShippingMethod};
pub use error::{CheckoutError, Result};
pub use events::{EventSink, InMemoryEventSink, OrderEvent, TracingEventSink};
pub use gateway::{GatewayError, InMemoryPaymentGateway, IntentHandle, PaymentGateway};
pub use payments::{IntentResponse, PaymentOutcome, PaymentsService};
pub use workflow::{OrderWorkflow, PlaceOrder};
