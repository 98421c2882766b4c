//! Coupon evaluator.

use chrono::{DateTime, Utc};
use common::CouponId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;

/// Reasons a coupon is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CouponError {
    /// No coupon exists for the submitted code.
    #[error("Unknown coupon code: {code}")]
    UnknownCode { code: String },

    /// The coupon has been deactivated.
    #[error("Coupon is not active")]
    Inactive,

    /// The validity window has not opened yet.
    #[error("Coupon is not valid yet")]
    NotYetActive,

    /// The validity window has closed.
    #[error("Coupon has expired")]
    Expired,

    /// Every permitted redemption has been used.
    #[error("Coupon usage limit reached")]
    UsageLimitReached,

    /// The order subtotal is below the coupon's minimum.
    #[error("Order amount {actual} is below the coupon minimum {required}")]
    BelowMinimum { required: Money, actual: Money },
}

/// How a coupon's value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouponKind {
    /// `value` is a whole-number percentage of the subtotal.
    Percentage,
    /// `value` is a fixed amount in cents.
    Fixed,
}

/// A discount code with validity and usage constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    id: CouponId,
    code: String,
    kind: CouponKind,
    /// Percentage (0-100) for [`CouponKind::Percentage`], cents for
    /// [`CouponKind::Fixed`].
    value: i64,
    min_order_amount: Option<Money>,
    max_discount_amount: Option<Money>,
    usage_limit: Option<u32>,
    usage_count: u32,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    is_active: bool,
}

impl Coupon {
    /// Creates an active coupon with no window, minimum, cap or usage
    /// limit. Codes are stored uppercase.
    pub fn new(id: CouponId, code: impl Into<String>, kind: CouponKind, value: i64) -> Self {
        Self {
            id,
            code: code.into().to_uppercase(),
            kind,
            value,
            min_order_amount: None,
            max_discount_amount: None,
            usage_limit: None,
            usage_count: 0,
            valid_from: None,
            valid_until: None,
            is_active: true,
        }
    }

    /// Rehydrates a coupon from persisted fields.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: CouponId,
        code: impl Into<String>,
        kind: CouponKind,
        value: i64,
        min_order_amount: Option<Money>,
        max_discount_amount: Option<Money>,
        usage_limit: Option<u32>,
        usage_count: u32,
        valid_from: Option<DateTime<Utc>>,
        valid_until: Option<DateTime<Utc>>,
        is_active: bool,
    ) -> Self {
        Self {
            id,
            code: code.into(),
            kind,
            value,
            min_order_amount,
            max_discount_amount,
            usage_limit,
            usage_count,
            valid_from,
            valid_until,
            is_active,
        }
    }

    pub fn with_window(
        mut self,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = from;
        self.valid_until = until;
        self
    }

    pub fn with_min_order(mut self, min: Money) -> Self {
        self.min_order_amount = Some(min);
        self
    }

    pub fn with_max_discount(mut self, max: Money) -> Self {
        self.max_discount_amount = Some(max);
        self
    }

    pub fn with_usage_limit(mut self, limit: u32) -> Self {
        self.usage_limit = Some(limit);
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn id(&self) -> CouponId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn kind(&self) -> CouponKind {
        self.kind
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn min_order_amount(&self) -> Option<Money> {
        self.min_order_amount
    }

    pub fn max_discount_amount(&self) -> Option<Money> {
        self.max_discount_amount
    }

    pub fn usage_count(&self) -> u32 {
        self.usage_count
    }

    pub fn usage_limit(&self) -> Option<u32> {
        self.usage_limit
    }

    pub fn valid_from(&self) -> Option<DateTime<Utc>> {
        self.valid_from
    }

    pub fn valid_until(&self) -> Option<DateTime<Utc>> {
        self.valid_until
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Records one redemption. The store layer is responsible for
    /// making the increment atomic under concurrent checkouts.
    pub fn record_redemption(&mut self) {
        self.usage_count += 1;
    }

    /// Reverses one redemption after a failed checkout.
    pub fn release_redemption(&mut self) {
        self.usage_count = self.usage_count.saturating_sub(1);
    }

    /// Checks the active flag, validity window and usage limit.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), CouponError> {
        if !self.is_active {
            return Err(CouponError::Inactive);
        }
        if let Some(from) = self.valid_from
            && now < from
        {
            return Err(CouponError::NotYetActive);
        }
        if let Some(until) = self.valid_until
            && now > until
        {
            return Err(CouponError::Expired);
        }
        if let Some(limit) = self.usage_limit
            && self.usage_count >= limit
        {
            return Err(CouponError::UsageLimitReached);
        }
        Ok(())
    }

    /// [`Coupon::validate`] plus the minimum-order-amount check.
    pub fn check_applicable(
        &self,
        order_amount: Money,
        now: DateTime<Utc>,
    ) -> Result<(), CouponError> {
        self.validate(now)?;
        if let Some(min) = self.min_order_amount
            && order_amount < min
        {
            return Err(CouponError::BelowMinimum {
                required: min,
                actual: order_amount,
            });
        }
        Ok(())
    }

    /// Computes the discount against an order amount.
    ///
    /// Returns zero when the coupon is not applicable. The base
    /// discount (percentage rounded half-up, or the fixed value) is
    /// clamped to `max_discount_amount` and never exceeds the order
    /// amount itself.
    pub fn discount_for(&self, order_amount: Money, now: DateTime<Utc>) -> Money {
        if self.check_applicable(order_amount, now).is_err() {
            return Money::zero();
        }

        let base = match self.kind {
            CouponKind::Percentage => order_amount.percentage(self.value),
            CouponKind::Fixed => Money::from_cents(self.value),
        };

        let capped = match self.max_discount_amount {
            Some(max) => base.min(max),
            None => base,
        };

        capped.min(order_amount)
    }
}
