// core/src/error.rs

//! Error types: `PipelineError` for the step engine and `FulfillmentError`,
//! the single error enum surfaced by every fulfillment component.

use crate::models::OrderStatus;
use crate::store::StoreError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("Handler missing for non-optional step: {step_name}")]
  HandlerMissing { step_name: String },

  #[error("Internal pipeline error: {0}")]
  Internal(String),
}

/// Coarse classification used by transports to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
  Validation,
  NotFound,
  Conflict,
  Forbidden,
  Internal,
}

#[derive(Debug, Error)]
pub enum FulfillmentError {
  #[error("Invalid '{field}': {message}")]
  Validation { field: &'static str, message: String },

  #[error("Coupon '{code}' not found")]
  CouponNotFound { code: String },

  #[error("Coupon '{code}' is not active")]
  CouponInactive { code: String },

  #[error("Coupon '{code}' expired at {expired_at}")]
  CouponExpired { code: String, expired_at: DateTime<Utc> },

  #[error("Order amount {order_amount_cents} is below the coupon minimum of {minimum_cents}")]
  MinimumOrderNotMet { order_amount_cents: i64, minimum_cents: i64 },

  #[error("Coupon '{code}' has reached its per-user limit of {usage_limit} redemptions")]
  QuotaExceeded { code: String, usage_limit: i32 },

  #[error("Order {0} not found")]
  OrderNotFound(Uuid),

  #[error("Registration {0} not found")]
  RegistrationNotFound(Uuid),

  #[error("Withdrawal request {0} not found")]
  RequestNotFound(Uuid),

  #[error("Event {0} not found")]
  EventNotFound(Uuid),

  #[error("User {user_id} already holds an open registration for event {event_id}")]
  DuplicateRegistration { user_id: Uuid, event_id: Uuid },

  #[error("Registration {0} already has a pending or approved withdrawal request")]
  DuplicateRequest(Uuid),

  #[error("Invalid {entity} state transition: {from} -> {to}")]
  InvalidStateTransition { entity: &'static str, from: String, to: String },

  #[error("Registration {0} is not active on a completed order")]
  RegistrationNotCompleted(Uuid),

  #[error("Forbidden: {0}")]
  Forbidden(String),

  #[error("Order {order_id} transition to {target} failed: {source}")]
  OrderTransitionFailed {
    order_id: Uuid,
    target: OrderStatus,
    source: Box<FulfillmentError>,
  },

  #[error("Transaction exceeded its {timeout:?} budget and was rolled back")]
  TransactionTimeout { timeout: Duration },

  #[error("Storage error: {0}")]
  Storage(#[from] StoreError),

  #[error("Pipeline error: {source}")]
  Pipeline {
    #[from]
    source: PipelineError,
  },
}

impl FulfillmentError {
  pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
    FulfillmentError::Validation {
      field,
      message: message.into(),
    }
  }

  pub fn kind(&self) -> ErrorKind {
    use FulfillmentError::*;
    match self {
      Validation { .. } => ErrorKind::Validation,
      CouponNotFound { .. } | OrderNotFound(_) | RegistrationNotFound(_) | RequestNotFound(_) | EventNotFound(_) => {
        ErrorKind::NotFound
      }
      CouponInactive { .. }
      | CouponExpired { .. }
      | MinimumOrderNotMet { .. }
      | QuotaExceeded { .. }
      | DuplicateRegistration { .. }
      | DuplicateRequest(_)
      | InvalidStateTransition { .. }
      | RegistrationNotCompleted(_) => ErrorKind::Conflict,
      Forbidden(_) => ErrorKind::Forbidden,
      OrderTransitionFailed { source, .. } => source.kind(),
      TransactionTimeout { .. } | Storage(_) | Pipeline { .. } => ErrorKind::Internal,
    }
  }

  /// Stable machine-readable code for API clients.
  pub fn code(&self) -> &'static str {
    use FulfillmentError::*;
    match self {
      Validation { .. } => "VALIDATION_ERROR",
      CouponNotFound { .. } => "COUPON_NOT_FOUND",
      CouponInactive { .. } => "COUPON_INACTIVE",
      CouponExpired { .. } => "COUPON_EXPIRED",
      MinimumOrderNotMet { .. } => "MINIMUM_ORDER_NOT_MET",
      QuotaExceeded { .. } => "QUOTA_EXCEEDED",
      OrderNotFound(_) => "ORDER_NOT_FOUND",
      RegistrationNotFound(_) => "REGISTRATION_NOT_FOUND",
      RequestNotFound(_) => "REQUEST_NOT_FOUND",
      EventNotFound(_) => "EVENT_NOT_FOUND",
      DuplicateRegistration { .. } => "DUPLICATE_REGISTRATION",
      DuplicateRequest(_) => "DUPLICATE_REQUEST",
      InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
      RegistrationNotCompleted(_) => "REGISTRATION_NOT_COMPLETED",
      Forbidden(_) => "FORBIDDEN",
      OrderTransitionFailed { .. } => "ORDER_TRANSITION_FAILED",
      TransactionTimeout { .. } => "TRANSACTION_TIMEOUT",
      Storage(_) | Pipeline { .. } => "INTERNAL",
    }
  }

  /// Whether a fresh attempt of the whole transaction may succeed.
  pub fn is_transient(&self) -> bool {
    match self {
      FulfillmentError::Storage(StoreError::Transient(_)) => true,
      FulfillmentError::OrderTransitionFailed { source, .. } => source.is_transient(),
      _ => false,
    }
  }

  /// The innermost cause, looking through `OrderTransitionFailed` wrappers.
  pub fn root_cause(&self) -> &FulfillmentError {
    match self {
      FulfillmentError::OrderTransitionFailed { source, .. } => source.root_cause(),
      other => other,
    }
  }
}

pub type FulfillmentResult<T, E = FulfillmentError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wrapped_transition_failure_takes_kind_of_cause() {
    let err = FulfillmentError::OrderTransitionFailed {
      order_id: Uuid::nil(),
      target: OrderStatus::Completed,
      source: Box::new(FulfillmentError::QuotaExceeded {
        code: "SPRING".into(),
        usage_limit: 1,
      }),
    };
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.code(), "ORDER_TRANSITION_FAILED");
    assert!(matches!(err.root_cause(), FulfillmentError::QuotaExceeded { .. }));
    assert!(!err.is_transient());
  }

  #[test]
  fn transient_storage_failure_is_retryable_through_wrapper() {
    let err = FulfillmentError::OrderTransitionFailed {
      order_id: Uuid::nil(),
      target: OrderStatus::Cancelled,
      source: Box::new(StoreError::Transient("deadlock detected".into()).into()),
    };
    assert!(err.is_transient());
    assert_eq!(err.kind(), ErrorKind::Internal);
  }
}
