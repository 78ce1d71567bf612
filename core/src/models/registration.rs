// core/src/models/registration.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ParseEnumError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrationStatus {
  /// Opened at checkout, order not paid yet.
  Pending,
  /// Order completed; invoice and receipt issued.
  Active,
  /// Released. Frees the (user, event) slot for a new registration.
  Cancelled,
}

impl RegistrationStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      RegistrationStatus::Pending => "pending",
      RegistrationStatus::Active => "active",
      RegistrationStatus::Cancelled => "cancelled",
    }
  }
}

impl fmt::Display for RegistrationStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(self, f)
  }
}

impl FromStr for RegistrationStatus {
  type Err = ParseEnumError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "pending" => Ok(RegistrationStatus::Pending),
      "active" => Ok(RegistrationStatus::Active),
      "cancelled" => Ok(RegistrationStatus::Cancelled),
      _ => Err(ParseEnumError::new("registration status", s)),
    }
  }
}

/// A user's seat at an event. A user holds at most one non-cancelled
/// registration per event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRegistration {
  pub id: Uuid,
  pub user_id: Uuid,
  pub event_id: Uuid,
  pub order_id: Option<Uuid>,
  pub status: RegistrationStatus,
  pub invoice_url: Option<String>,
  pub receipt_url: Option<String>,
  pub registered_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl EventRegistration {
  /// Counts toward the one-open-registration-per-event rule.
  pub fn is_open(&self) -> bool {
    self.status != RegistrationStatus::Cancelled
  }
}
