// core/src/models/principal.rs

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::ParseEnumError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
  /// May act only on their own orders, registrations and requests.
  Customer,
  Admin,
  /// Trusted internal caller, e.g. the payment confirmation hook.
  System,
}

impl FromStr for Role {
  type Err = ParseEnumError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "customer" | "user" => Ok(Role::Customer),
      "admin" => Ok(Role::Admin),
      "system" => Ok(Role::System),
      _ => Err(ParseEnumError::new("role", s)),
    }
  }
}

/// An already-authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
  pub id: Uuid,
  pub role: Role,
}

impl Principal {
  pub fn customer(id: Uuid) -> Self {
    Self { id, role: Role::Customer }
  }

  pub fn admin(id: Uuid) -> Self {
    Self { id, role: Role::Admin }
  }

  /// The system caller carries the nil id; it owns nothing.
  pub fn system() -> Self {
    Self {
      id: Uuid::nil(),
      role: Role::System,
    }
  }

  pub fn is_admin(&self) -> bool {
    self.role == Role::Admin
  }

  /// Admins and the system caller.
  pub fn is_trusted(&self) -> bool {
    matches!(self.role, Role::Admin | Role::System)
  }

  /// Owners act for themselves; trusted callers act for anyone.
  pub fn can_act_for(&self, user_id: Uuid) -> bool {
    self.is_trusted() || self.id == user_id
  }
}
