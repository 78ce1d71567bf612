// core/src/withdrawals.rs

//! Refund requests against completed registrations and their admin review.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{event, instrument, Level};
use uuid::Uuid;

use crate::error::{FulfillmentError, FulfillmentResult};
use crate::models::{OrderStatus, Principal, RegistrationStatus, WithdrawalRequest, WithdrawalStatus};
use crate::orders::{OrderLifecycleManager, RefundScope, TransitionCommand, TransitionOutcome};
use crate::store::{constraints, Store, StoreTx};
use crate::txn::TransactionRunner;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalDecision {
  pub request: WithdrawalRequest,
  /// Present when this call approved the request.
  pub refund: Option<TransitionOutcome>,
}

pub struct WithdrawalApprovalWorkflow<S: Store> {
  store: S,
  orders: Arc<OrderLifecycleManager<S>>,
  runner: TransactionRunner,
}

impl<S: Store> WithdrawalApprovalWorkflow<S> {
  pub fn new(store: S, orders: Arc<OrderLifecycleManager<S>>, runner: TransactionRunner) -> Self {
    Self { store, orders, runner }
  }

  /// Files a refund request for one of the principal's own registrations.
  /// The registration must be Active on a Completed order and must not have
  /// another Pending or Approved request.
  #[instrument(name = "WithdrawalApprovalWorkflow::request_withdrawal", skip(self, reason, document), err(Display))]
  pub async fn request_withdrawal(
    &self,
    principal: &Principal,
    registration_id: Uuid,
    reason: &str,
    document: &str,
  ) -> FulfillmentResult<WithdrawalRequest> {
    let reason = reason.trim();
    let document = document.trim();
    if reason.is_empty() {
      return Err(FulfillmentError::validation("reason", "must not be empty"));
    }
    if document.is_empty() {
      return Err(FulfillmentError::validation("document", "must not be empty"));
    }

    self
      .runner
      .run("withdrawal.request", || self.request_once(principal, registration_id, reason, document))
      .await
  }

  async fn request_once(
    &self,
    principal: &Principal,
    registration_id: Uuid,
    reason: &str,
    document: &str,
  ) -> FulfillmentResult<WithdrawalRequest> {
    let mut tx = self.store.begin().await?;
    let registration = tx
      .lock_registration(registration_id)
      .await?
      .ok_or(FulfillmentError::RegistrationNotFound(registration_id))?;
    if registration.user_id != principal.id {
      return Err(FulfillmentError::Forbidden(
        "withdrawals can only be requested for your own registrations".to_string(),
      ));
    }

    if registration.status != RegistrationStatus::Active {
      return Err(FulfillmentError::RegistrationNotCompleted(registration_id));
    }
    let order = match registration.order_id {
      Some(order_id) => tx.find_order(order_id).await?,
      None => None,
    };
    if order.map(|o| o.status) != Some(OrderStatus::Completed) {
      return Err(FulfillmentError::RegistrationNotCompleted(registration_id));
    }

    if tx.open_withdrawal_for_registration(registration_id).await?.is_some() {
      return Err(FulfillmentError::DuplicateRequest(registration_id));
    }

    let request = WithdrawalRequest {
      id: Uuid::new_v4(),
      register_id: registration_id,
      user_id: principal.id,
      reason: reason.to_string(),
      document: document.to_string(),
      status: WithdrawalStatus::Pending,
      refund_amount_cents: None,
      reviewed_by: None,
      created_at: Utc::now(),
      reviewed_at: None,
    };
    match tx.insert_withdrawal(&request).await {
      Ok(()) => {}
      Err(err) if err.violates(constraints::OPEN_WITHDRAWAL) => {
        return Err(FulfillmentError::DuplicateRequest(registration_id))
      }
      Err(err) => return Err(err.into()),
    }
    tx.commit().await?;

    event!(Level::INFO, request_id = %request.id, %registration_id, "Withdrawal requested.");
    Ok(request)
  }

  /// Records an admin decision. Approval refunds the registration's share of
  /// the paid price and cancels it through the order state machine, in the
  /// same transaction. Repeating the decision already recorded is a no-op.
  #[instrument(name = "WithdrawalApprovalWorkflow::manage", skip(self, admin), fields(admin_id = %admin.id), err(Display))]
  pub async fn manage(
    &self,
    request_id: Uuid,
    decision: WithdrawalStatus,
    admin: &Principal,
  ) -> FulfillmentResult<WithdrawalDecision> {
    if !admin.is_admin() {
      return Err(FulfillmentError::Forbidden("only admins can review withdrawals".to_string()));
    }
    if decision == WithdrawalStatus::Pending {
      return Err(FulfillmentError::validation("status", "decision must be Approved or Rejected"));
    }

    self
      .runner
      .run("withdrawal.manage", || self.manage_once(request_id, decision, admin))
      .await
  }

  async fn manage_once(
    &self,
    request_id: Uuid,
    decision: WithdrawalStatus,
    admin: &Principal,
  ) -> FulfillmentResult<WithdrawalDecision> {
    let mut tx = self.store.begin().await?;
    let mut request = tx
      .lock_withdrawal(request_id)
      .await?
      .ok_or(FulfillmentError::RequestNotFound(request_id))?;

    if request.status == decision {
      return Ok(WithdrawalDecision { request, refund: None });
    }
    if !request.status.can_transition_to(decision) {
      return Err(FulfillmentError::InvalidStateTransition {
        entity: "withdrawal",
        from: request.status.to_string(),
        to: decision.to_string(),
      });
    }

    request.status = decision;
    request.reviewed_by = Some(admin.id);
    request.reviewed_at = Some(Utc::now());

    let mut refund = None;
    if decision == WithdrawalStatus::Approved {
      let order_id = ensure_refundable(&mut tx, request.register_id).await?;
      request.refund_amount_cents = Some(refund_share(&mut tx, request.register_id, order_id).await?);
      tx.update_withdrawal(&request).await?;

      let command = TransitionCommand {
        order_id,
        target: OrderStatus::Refunded,
        actor: admin.clone(),
        scope: RefundScope::Registrations(vec![request.register_id]),
      };
      let (returned, outcome) = self.orders.execute(tx, command).await?;
      tx = returned;
      refund = Some(outcome);
    } else {
      tx.update_withdrawal(&request).await?;
    }
    tx.commit().await?;

    event!(
      Level::INFO,
      %request_id,
      status = %request.status,
      refund_amount_cents = ?request.refund_amount_cents,
      "Withdrawal reviewed."
    );
    Ok(WithdrawalDecision { request, refund })
  }

  /// Newest first, optionally filtered by status.
  pub async fn list(&self, admin: &Principal, status: Option<WithdrawalStatus>) -> FulfillmentResult<Vec<WithdrawalRequest>> {
    if !admin.is_admin() {
      return Err(FulfillmentError::Forbidden("only admins can list withdrawals".to_string()));
    }
    self.runner.run("withdrawal.list", || self.list_once(status)).await
  }

  async fn list_once(&self, status: Option<WithdrawalStatus>) -> FulfillmentResult<Vec<WithdrawalRequest>> {
    let mut tx = self.store.begin().await?;
    Ok(tx.list_withdrawals(status).await?)
  }
}

/// Locks the registration and checks it can still be refunded: Active on a
/// Completed order. Returns the order id.
async fn ensure_refundable<T: StoreTx>(tx: &mut T, registration_id: Uuid) -> FulfillmentResult<Uuid> {
  let registration = tx
    .lock_registration(registration_id)
    .await?
    .ok_or(FulfillmentError::RegistrationNotFound(registration_id))?;
  let order_id = registration
    .order_id
    .ok_or(FulfillmentError::RegistrationNotCompleted(registration_id))?;
  if registration.status != RegistrationStatus::Active {
    return Err(FulfillmentError::RegistrationNotCompleted(registration_id));
  }
  let order = tx.lock_order(order_id).await?.ok_or(FulfillmentError::OrderNotFound(order_id))?;
  if order.status != OrderStatus::Completed {
    return Err(FulfillmentError::RegistrationNotCompleted(registration_id));
  }
  Ok(order_id)
}

/// The registration's item share of what was actually paid:
/// `item_price * paid / gross`, rounded half up.
///
/// Shares are capped by what is still refundable on the order, and the last
/// Active registration receives exactly the remainder, so the approved
/// refunds of one order always add up to the price paid.
async fn refund_share<T: StoreTx>(tx: &mut T, registration_id: Uuid, order_id: Uuid) -> FulfillmentResult<i64> {
  let order = tx.find_order(order_id).await?.ok_or(FulfillmentError::OrderNotFound(order_id))?;
  let registrations = tx.registrations_for_order(order_id).await?;
  let registration = registrations
    .iter()
    .find(|r| r.id == registration_id)
    .ok_or(FulfillmentError::RegistrationNotFound(registration_id))?;
  let item = tx
    .order_items(order_id)
    .await?
    .into_iter()
    .find(|i| i.event_id == registration.event_id)
    .ok_or(FulfillmentError::EventNotFound(registration.event_id))?;

  let mut already_refunded = 0i64;
  for other in registrations.iter().filter(|r| r.id != registration_id) {
    if let Some(approved) = tx.open_withdrawal_for_registration(other.id).await? {
      if approved.status == WithdrawalStatus::Approved {
        already_refunded += approved.refund_amount_cents.unwrap_or(0);
      }
    }
  }
  let remaining = (order.price_cents - already_refunded).max(0);

  let last_active = !registrations
    .iter()
    .any(|r| r.id != registration_id && r.status == RegistrationStatus::Active);
  if last_active {
    return Ok(remaining);
  }
  Ok(proportional_share(item.price_cents, order.price_cents, order.gross_cents()).min(remaining))
}

fn proportional_share(item_cents: i64, paid_cents: i64, gross_cents: i64) -> i64 {
  if gross_cents <= 0 {
    return 0;
  }
  let numerator = item_cents as i128 * paid_cents as i128 * 2 + gross_cents as i128;
  (numerator / (2 * gross_cents as i128)) as i64
}

#[cfg(test)]
mod tests {
  use super::proportional_share;

  #[test]
  fn share_follows_item_weight() {
    assert_eq!(proportional_share(10_000, 10_000, 10_000), 10_000);
    // 3 equal items, 10% off: 9000 * 1/3
    assert_eq!(proportional_share(3_000, 8_100, 9_000), 2_700);
    assert_eq!(proportional_share(1, 1, 2), 1);
    assert_eq!(proportional_share(5, 0, 5), 0);
    assert_eq!(proportional_share(5, 5, 0), 0);
  }
}
