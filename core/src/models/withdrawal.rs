// core/src/models/withdrawal.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ParseEnumError;

/// Review state of a withdrawal request. Approved and Rejected are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WithdrawalStatus {
  Pending,
  Approved,
  Rejected,
}

impl WithdrawalStatus {
  pub const TRANSITIONS: [(WithdrawalStatus, WithdrawalStatus); 2] = [
    (WithdrawalStatus::Pending, WithdrawalStatus::Approved),
    (WithdrawalStatus::Pending, WithdrawalStatus::Rejected),
  ];

  pub fn can_transition_to(self, target: WithdrawalStatus) -> bool {
    Self::TRANSITIONS.contains(&(self, target))
  }

  /// Pending and Approved requests block a new request for the same
  /// registration.
  pub fn is_open(self) -> bool {
    matches!(self, WithdrawalStatus::Pending | WithdrawalStatus::Approved)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      WithdrawalStatus::Pending => "pending",
      WithdrawalStatus::Approved => "approved",
      WithdrawalStatus::Rejected => "rejected",
    }
  }
}

impl fmt::Display for WithdrawalStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(self, f)
  }
}

impl FromStr for WithdrawalStatus {
  type Err = ParseEnumError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "pending" => Ok(WithdrawalStatus::Pending),
      "approved" => Ok(WithdrawalStatus::Approved),
      "rejected" => Ok(WithdrawalStatus::Rejected),
      _ => Err(ParseEnumError::new("withdrawal status", s)),
    }
  }
}

/// A customer's request to refund one registration, reviewed by an admin.
/// `refund_amount_cents` is set on approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequest {
  pub id: Uuid,
  pub register_id: Uuid,
  pub user_id: Uuid,
  pub reason: String,
  /// Reference to a document held by the external file store.
  pub document: String,
  pub status: WithdrawalStatus,
  pub refund_amount_cents: Option<i64>,
  pub reviewed_by: Option<Uuid>,
  pub created_at: DateTime<Utc>,
  pub reviewed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decisions_are_terminal() {
    use WithdrawalStatus::*;
    assert!(Pending.can_transition_to(Approved));
    assert!(Pending.can_transition_to(Rejected));
    assert!(!Approved.can_transition_to(Rejected));
    assert!(!Rejected.can_transition_to(Pending));
    assert!(Approved.is_open());
    assert!(!Rejected.is_open());
  }
}
