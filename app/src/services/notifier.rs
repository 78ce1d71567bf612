// app/src/services/notifier.rs

//! Post-commit customer notifications. Delivery is simulated and never
//! blocks or fails the request that triggered it.

use crate::errors::{AppError, Result as AppResult};
use fulfillment::models::{OrderStatus, WithdrawalStatus};
use fulfillment::{TransitionOutcome, WithdrawalDecision};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Receipt of a simulated delivery.
#[derive(Debug)]
pub struct SentNotification {
  pub to: String,
  pub subject: String,
  pub message_id: String,
}

#[derive(Debug, Clone)]
pub struct Notifier {
  sender: Arc<str>,
}

impl Notifier {
  pub fn new(sender: impl Into<String>) -> Self {
    Self {
      sender: Arc::from(sender.into()),
    }
  }

  /// Announces a committed order status change. No-op transitions are not
  /// announced.
  pub fn order_status_changed(&self, outcome: &TransitionOutcome) {
    if !outcome.changed {
      return;
    }
    let order = &outcome.order;
    let subject = format!("Order {} is now {}", order.order_no, order.status);
    let body = match order.status {
      OrderStatus::Completed => {
        let invoices: Vec<&str> = outcome
          .registrations
          .iter()
          .filter_map(|r| r.invoice_url.as_deref())
          .collect();
        format!("Your registrations are active. Invoices: {}", invoices.join(", "))
      }
      OrderStatus::Cancelled => "Your order was cancelled and its registrations released.".to_string(),
      OrderStatus::Refunded => "Your order was refunded.".to_string(),
      OrderStatus::Pending => "Your order is awaiting payment.".to_string(),
    };
    self.dispatch(order.user_id, subject, body);
  }

  pub fn withdrawal_reviewed(&self, decision: &WithdrawalDecision) {
    let request = &decision.request;
    let subject = format!("Withdrawal request {}", request.status);
    let body = match (request.status, request.refund_amount_cents) {
      (WithdrawalStatus::Approved, Some(cents)) => format!("A refund of {} cents has been issued.", cents),
      (WithdrawalStatus::Rejected, _) => "Your withdrawal request was rejected.".to_string(),
      _ => format!("Your withdrawal request is {}.", request.status),
    };
    self.dispatch(request.user_id, subject, body);
  }

  fn dispatch(&self, user_id: Uuid, subject: String, body: String) {
    let to = format!("user:{}", user_id);
    let from = self.sender.to_string();
    tokio::spawn(async move {
      match send_mock_notification(&to, &from, &subject, &body).await {
        Ok(sent) => info!(
          message_id = %sent.message_id,
          to = %sent.to,
          subject = %sent.subject,
          "Notification delivered."
        ),
        Err(e) => warn!(error = %e, to = %to, "Notification delivery failed."),
      }
    });
  }
}

pub async fn send_mock_notification(to: &str, from: &str, subject: &str, body: &str) -> AppResult<SentNotification> {
  info!("Simulating notification: To='{}', From='{}', Subject='{}'", to, from, subject);
  tokio::time::sleep(std::time::Duration::from_millis(20)).await;

  if subject.to_lowercase().contains("fail_test") {
    return Err(AppError::Internal("Simulated notification failure".to_string()));
  }

  let body_preview = body.chars().take(50).collect::<String>();
  tracing::debug!(%body_preview, "Mock notification body.");

  Ok(SentNotification {
    to: to.to_string(),
    subject: subject.to_string(),
    message_id: format!("mock_notification_{}", Uuid::new_v4()),
  })
}
