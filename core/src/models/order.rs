// core/src/models/order.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ParseEnumError;

/// Lifecycle of an order. Cancelled and Refunded are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
  /// Created at checkout, awaiting payment.
  Pending,
  /// Paid. Coupon redeemed, registrations Active.
  Completed,
  Cancelled,
  /// Every registration was refunded through approved withdrawals.
  Refunded,
}

impl OrderStatus {
  /// Every legal edge of the order state machine. Anything else is rejected
  /// before a single row is touched.
  pub const TRANSITIONS: [(OrderStatus, OrderStatus); 3] = [
    (OrderStatus::Pending, OrderStatus::Completed),
    (OrderStatus::Pending, OrderStatus::Cancelled),
    (OrderStatus::Completed, OrderStatus::Refunded),
  ];

  pub fn can_transition_to(self, target: OrderStatus) -> bool {
    Self::TRANSITIONS.contains(&(self, target))
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
  }

  /// Storage representation.
  pub fn as_str(self) -> &'static str {
    match self {
      OrderStatus::Pending => "pending",
      OrderStatus::Completed => "completed",
      OrderStatus::Cancelled => "cancelled",
      OrderStatus::Refunded => "refunded",
    }
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(self, f)
  }
}

impl FromStr for OrderStatus {
  type Err = ParseEnumError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "pending" => Ok(OrderStatus::Pending),
      "completed" => Ok(OrderStatus::Completed),
      "cancelled" => Ok(OrderStatus::Cancelled),
      "refunded" => Ok(OrderStatus::Refunded),
      _ => Err(ParseEnumError::new("order status", s)),
    }
  }
}

/// A purchase of one or more events. Money is in cents; `price_cents` is what
/// the customer pays and `discount_cents` what the coupon took off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: Uuid,
  pub user_id: Uuid,
  /// See [`Order::order_number_for`].
  pub order_no: String,
  pub status: OrderStatus,
  /// Final payable amount, after discount.
  pub price_cents: i64,
  pub payment_method: String,
  pub discount_cents: i64,
  /// Quoted at checkout; redeemed only when the order completes.
  pub coupon_id: Option<Uuid>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Order {
  /// Amount before discount.
  pub fn gross_cents(&self) -> i64 {
    self.price_cents + self.discount_cents
  }

  /// Human-facing order number, e.g. `ORD-20261018-3F2A9C1B`.
  pub fn order_number_for(id: Uuid, created_at: DateTime<Utc>) -> String {
    let suffix = id.simple().to_string()[..8].to_ascii_uppercase();
    format!("ORD-{}-{}", created_at.format("%Y%m%d"), suffix)
  }
}

/// One purchased event. An order holds one item per distinct event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
  pub id: Uuid,
  pub order_id: Uuid,
  pub event_id: Uuid,
  /// 1-based position within the order; feeds invoice numbering.
  pub line_no: i32,
  /// Event price at purchase time.
  pub price_cents: i64,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn transition_table_allows_only_documented_edges() {
    use OrderStatus::*;
    let all = [Pending, Completed, Cancelled, Refunded];
    let mut allowed = Vec::new();
    for from in all {
      for to in all {
        if from.can_transition_to(to) {
          allowed.push((from, to));
        }
      }
    }
    assert_eq!(allowed, vec![(Pending, Completed), (Pending, Cancelled), (Completed, Refunded)]);
  }

  #[test]
  fn status_round_trips_through_storage_name() {
    for status in [OrderStatus::Pending, OrderStatus::Refunded] {
      assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
    }
    assert!("shipped".parse::<OrderStatus>().is_err());
  }

  #[test]
  fn order_number_is_derived_from_id_and_date() {
    let id = Uuid::parse_str("3f2a9c1b-0000-4000-8000-000000000000").unwrap();
    let at = DateTime::parse_from_rfc3339("2026-10-18T09:30:00Z").unwrap().with_timezone(&Utc);
    assert_eq!(Order::order_number_for(id, at), "ORD-20261018-3F2A9C1B");
  }
}
