// core/src/models/coupon.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ParseEnumError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
  /// `discount_value` is a whole percent, 0 to 100.
  Percentage,
  /// `discount_value` is an amount in cents.
  Fixed,
}

impl DiscountType {
  pub fn as_str(self) -> &'static str {
    match self {
      DiscountType::Percentage => "percentage",
      DiscountType::Fixed => "fixed",
    }
  }
}

impl fmt::Display for DiscountType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for DiscountType {
  type Err = ParseEnumError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "percentage" => Ok(DiscountType::Percentage),
      "fixed" => Ok(DiscountType::Fixed),
      _ => Err(ParseEnumError::new("discount type", s)),
    }
  }
}

/// A discount code. Codes are unique; `discount_value` is a percentage
/// (0-100) or an amount in cents depending on `discount_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
  pub id: Uuid,
  pub code: String,
  pub is_active: bool,
  /// Minimum order amount the coupon applies to.
  pub min_order_cents: i64,
  pub discount_value: i64,
  pub discount_type: DiscountType,
  /// Redemptions allowed per user.
  pub usage_limit: i32,
  /// No expiry when `None`; otherwise usable up to and including this instant.
  pub expiry_date: Option<DateTime<Utc>>,
}

impl Coupon {
  pub fn percentage(code: impl Into<String>, percent: i64, usage_limit: i32) -> Self {
    Self::new(code, DiscountType::Percentage, percent, usage_limit)
  }

  pub fn fixed(code: impl Into<String>, amount_cents: i64, usage_limit: i32) -> Self {
    Self::new(code, DiscountType::Fixed, amount_cents, usage_limit)
  }

  fn new(code: impl Into<String>, discount_type: DiscountType, discount_value: i64, usage_limit: i32) -> Self {
    Self {
      id: Uuid::new_v4(),
      code: code.into(),
      is_active: true,
      min_order_cents: 0,
      discount_value,
      discount_type,
      usage_limit,
      expiry_date: None,
    }
  }

  pub fn with_min_order(mut self, min_order_cents: i64) -> Self {
    self.min_order_cents = min_order_cents;
    self
  }

  pub fn with_expiry(mut self, expiry_date: DateTime<Utc>) -> Self {
    self.expiry_date = Some(expiry_date);
    self
  }

  pub fn deactivated(mut self) -> Self {
    self.is_active = false;
    self
  }

  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
    self.expiry_date.is_some_and(|expiry| now > expiry)
  }

  /// Discount for a non-negative order amount. Percentages round half up;
  /// the result never exceeds the amount.
  pub fn discount_for(&self, amount_cents: i64) -> i64 {
    let raw = match self.discount_type {
      DiscountType::Percentage => {
        let percent = self.discount_value.clamp(0, 100) as i128;
        ((amount_cents as i128 * percent + 50) / 100) as i64
      }
      DiscountType::Fixed => self.discount_value.max(0),
    };
    raw.min(amount_cents)
  }
}

/// One redemption of a coupon, written when the order completes. At most one
/// per order; the rows per (user, coupon) count against `usage_limit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponUsage {
  pub id: Uuid,
  pub user_id: Uuid,
  pub coupon_id: Uuid,
  pub order_id: Uuid,
  pub discount_cents: i64,
  pub used_at: DateTime<Utc>,
}

/// Result of a successful validation. Nothing is consumed by producing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountQuote {
  pub coupon: Coupon,
  pub discount_cents: i64,
  pub final_amount_cents: i64,
}
