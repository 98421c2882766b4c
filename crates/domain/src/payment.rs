//! Payment record and status machine.

use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;

/// Errors raised by payment operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaymentError {
    /// The requested transition is not allowed from the current status.
    #[error("Invalid payment transition: cannot {action} from {current_status} status")]
    InvalidStateTransition {
        current_status: PaymentStatus,
        action: &'static str,
    },
}

/// The status of a payment attempt.
///
/// Status transitions:
/// ```text
/// Pending ──► Processing ──┬──► Succeeded ──► Refunded
///    │            │        └──► Failed
///    ├────────────┴──► Failed
///    └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Intent created, awaiting the processor's outcome.
    #[default]
    Pending,

    /// The processor reported the charge as in flight.
    Processing,

    /// Funds captured.
    Succeeded,

    /// Declined or errored (terminal state for this attempt).
    Failed,

    /// Captured funds returned (terminal state).
    Refunded,

    /// Abandoned before confirmation (terminal state).
    Cancelled,
}

impl PaymentStatus {
    /// Returns true if a confirmation callback may still be applied.
    ///
    /// This is the idempotency guard: a repeated webhook for a payment
    /// that already confirmed is a no-op, never a second transition.
    pub fn can_confirm(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Processing)
    }

    /// Returns true if the payment can be refunded.
    pub fn can_refund(&self) -> bool {
        matches!(self, PaymentStatus::Succeeded)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Failed | PaymentStatus::Refunded | PaymentStatus::Cancelled
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A payment attempt against an order.
///
/// Holds only the processor reference and display metadata (brand and
/// last four digits); raw card data never enters the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    order_id: OrderId,
    amount: Money,
    currency: String,
    status: PaymentStatus,
    intent_ref: String,
    card_brand: Option<String>,
    card_last4: Option<String>,
    failure_reason: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl Payment {
    /// Creates a pending payment referencing a processor intent.
    pub fn new(
        id: PaymentId,
        order_id: OrderId,
        amount: Money,
        currency: impl Into<String>,
        intent_ref: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            order_id,
            amount,
            currency: currency.into(),
            status: PaymentStatus::Pending,
            intent_ref: intent_ref.into(),
            card_brand: None,
            card_last4: None,
            failure_reason: None,
            paid_at: None,
            created_at: now,
        }
    }

    pub fn id(&self) -> PaymentId {
        self.id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn intent_ref(&self) -> &str {
        &self.intent_ref
    }

    pub fn card_brand(&self) -> Option<&str> {
        self.card_brand.as_deref()
    }

    pub fn card_last4(&self) -> Option<&str> {
        self.card_last4.as_deref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Marks the charge captured, recording display metadata.
    pub fn succeed(
        &mut self,
        card_brand: Option<String>,
        card_last4: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), PaymentError> {
        if !self.status.can_confirm() {
            return Err(PaymentError::InvalidStateTransition {
                current_status: self.status,
                action: "succeed",
            });
        }
        self.status = PaymentStatus::Succeeded;
        self.card_brand = card_brand;
        self.card_last4 = card_last4;
        self.paid_at = Some(now);
        Ok(())
    }

    /// Marks the charge declined.
    pub fn fail(&mut self, reason: Option<String>) -> Result<(), PaymentError> {
        if !self.status.can_confirm() {
            return Err(PaymentError::InvalidStateTransition {
                current_status: self.status,
                action: "fail",
            });
        }
        self.status = PaymentStatus::Failed;
        self.failure_reason = reason;
        Ok(())
    }

    /// Marks captured funds as returned.
    pub fn refund(&mut self) -> Result<(), PaymentError> {
        if !self.status.can_refund() {
            return Err(PaymentError::InvalidStateTransition {
                current_status: self.status,
                action: "refund",
            });
        }
        self.status = PaymentStatus::Refunded;
        Ok(())
    }

    /// Abandons an unconfirmed payment.
    pub fn cancel(&mut self) -> Result<(), PaymentError> {
        if !self.status.can_confirm() {
            return Err(PaymentError::InvalidStateTransition {
                current_status: self.status,
                action: "cancel",
            });
        }
        self.status = PaymentStatus::Cancelled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment() -> Payment {
        Payment::new(
            PaymentId::new(),
            OrderId::new(),
            Money::from_cents(1800),
            "USD",
            "pi_0001",
            Utc::now(),
        )
    }

    #[test]
    fn test_new_payment_is_pending() {
        let p = payment();
        assert_eq!(p.status(), PaymentStatus::Pending);
        assert!(p.paid_at().is_none());
    }

    #[test]
    fn test_succeed_stamps_metadata() {
        let mut p = payment();
        let now = Utc::now();
        p.succeed(Some("visa".into()), Some("4242".into()), now)
            .unwrap();
        assert_eq!(p.status(), PaymentStatus::Succeeded);
        assert_eq!(p.card_brand(), Some("visa"));
        assert_eq!(p.card_last4(), Some("4242"));
        assert_eq!(p.paid_at(), Some(now));
    }

    #[test]
    fn test_confirm_is_guarded_after_success() {
        let mut p = payment();
        p.succeed(None, None, Utc::now()).unwrap();

        assert!(p.succeed(None, None, Utc::now()).is_err());
        assert!(p.fail(None).is_err());
        assert_eq!(p.status(), PaymentStatus::Succeeded);
    }

    #[test]
    fn test_fail_records_reason() {
        let mut p = payment();
        p.fail(Some("card_declined".into())).unwrap();
        assert_eq!(p.status(), PaymentStatus::Failed);
        assert_eq!(p.failure_reason(), Some("card_declined"));
        assert!(p.status().is_terminal());
    }

    #[test]
    fn test_refund_requires_success() {
        let mut p = payment();
        assert!(p.refund().is_err());

        p.succeed(None, None, Utc::now()).unwrap();
        p.refund().unwrap();
        assert_eq!(p.status(), PaymentStatus::Refunded);

        // Refunding twice is rejected.
        assert!(p.refund().is_err());
    }

    #[test]
    fn test_can_confirm_only_before_outcome() {
        assert!(PaymentStatus::Pending.can_confirm());
        assert!(PaymentStatus::Processing.can_confirm());
        assert!(!PaymentStatus::Succeeded.can_confirm());
        assert!(!PaymentStatus::Failed.can_confirm());
        assert!(!PaymentStatus::Refunded.can_confirm());
        assert!(!PaymentStatus::Cancelled.can_confirm());
    }
}
