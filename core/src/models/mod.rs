// core/src/models/mod.rs

//! Entities of the fulfillment pipeline. Money is always carried in integer
//! minor units (`*_cents`).

pub mod coupon;
pub mod event;
pub mod order;
pub mod principal;
pub mod registration;
pub mod withdrawal;

pub use coupon::{Coupon, CouponUsage, DiscountQuote, DiscountType};
pub use event::Event;
pub use order::{Order, OrderItem, OrderStatus};
pub use principal::{Principal, Role};
pub use registration::{EventRegistration, RegistrationStatus};
pub use withdrawal::{WithdrawalRequest, WithdrawalStatus};

use thiserror::Error;

/// Returned when a stored or submitted status string names no known variant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {entity} value '{value}'")]
pub struct ParseEnumError {
  pub entity: &'static str,
  pub value: String,
}

impl ParseEnumError {
  pub(crate) fn new(entity: &'static str, value: &str) -> Self {
    Self {
      entity,
      value: value.to_string(),
    }
  }
}
