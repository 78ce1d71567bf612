// core/src/config.rs

//! Tunables for the fulfillment components. The binary fills these from the
//! environment; tests and benches build them directly.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TransactionConfig {
  /// Budget for one transaction attempt. On expiry the attempt is dropped
  /// and rolled back.
  pub timeout: Duration,
  /// How many extra attempts a transient storage failure earns.
  pub max_transient_retries: u32,
  pub retry_backoff: Duration,
}

impl Default for TransactionConfig {
  fn default() -> Self {
    Self {
      timeout: Duration::from_secs(5),
      max_transient_retries: 1,
      retry_backoff: Duration::from_millis(50),
    }
  }
}

#[derive(Debug, Clone)]
pub struct DocumentConfig {
  /// Invoice and receipt URLs are rendered under this prefix.
  pub base_url: String,
}

impl Default for DocumentConfig {
  fn default() -> Self {
    Self {
      base_url: "https://tickets.local/documents".to_string(),
    }
  }
}

impl DocumentConfig {
  pub fn invoice_url(&self, number: &str) -> String {
    format!("{}/invoices/{}.pdf", self.base_url.trim_end_matches('/'), number)
  }

  pub fn receipt_url(&self, number: &str) -> String {
    format!("{}/receipts/{}.pdf", self.base_url.trim_end_matches('/'), number)
  }
}

#[derive(Debug, Clone, Default)]
pub struct FulfillmentConfig {
  pub transaction: TransactionConfig,
  pub documents: DocumentConfig,
}
