// core/src/models/event.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference data owned by the catalogue; the pipeline only reads it to
/// price order items and to check that an item's event still exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
  pub id: Uuid,
  pub title: String,
  pub price_cents: i64,
  pub created_at: DateTime<Utc>,
}

impl Event {
  pub fn new(title: impl Into<String>, price_cents: i64) -> Self {
    Self {
      id: Uuid::new_v4(),
      title: title.into(),
      price_cents,
      created_at: Utc::now(),
    }
  }
}
