// core/src/orders/mod.rs

//! Order creation and the order state machine.

mod checkout;
mod transition;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{event, instrument, Level};
use uuid::Uuid;

use crate::coupons::CouponQuotaEngine;
use crate::error::{FulfillmentError, FulfillmentResult};
use crate::models::{CouponUsage, EventRegistration, Order, OrderItem, OrderStatus, Principal};
use crate::pipeline::{Pipeline, PipelineResult};
use crate::registrations::RegistrationLedger;
use crate::store::{Store, StoreTx};
use crate::txn::TransactionRunner;

use checkout::{build_checkout_pipeline, CheckoutCtx};
use transition::{build_transition_pipeline, TransitionCtx};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
  pub user_id: Uuid,
  pub event_ids: Vec<Uuid>,
  pub coupon_code: Option<String>,
  pub payment_method: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
  pub order: Order,
  pub items: Vec<OrderItem>,
  pub registrations: Vec<EventRegistration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
  pub order: Order,
  pub previous_status: OrderStatus,
  /// False for a same-status no-op and for a refund that left Active
  /// registrations behind.
  pub changed: bool,
  pub coupon_usage: Option<CouponUsage>,
  pub registrations: Vec<EventRegistration>,
}

/// Which registrations a Refunded transition cancels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundScope {
  WholeOrder,
  Registrations(Vec<Uuid>),
}

#[derive(Debug, Clone)]
pub(crate) struct TransitionCommand {
  pub order_id: Uuid,
  pub target: OrderStatus,
  pub actor: Principal,
  pub scope: RefundScope,
}

pub struct OrderLifecycleManager<S: Store> {
  store: S,
  coupons: Arc<CouponQuotaEngine<S>>,
  ledger: Arc<RegistrationLedger>,
  runner: TransactionRunner,
  checkout: Pipeline<CheckoutCtx<S>, FulfillmentError>,
  transitions: Pipeline<TransitionCtx<S>, FulfillmentError>,
}

impl<S: Store> OrderLifecycleManager<S> {
  pub fn new(
    store: S,
    coupons: Arc<CouponQuotaEngine<S>>,
    ledger: Arc<RegistrationLedger>,
    runner: TransactionRunner,
  ) -> Self {
    Self {
      store,
      coupons,
      ledger,
      runner,
      checkout: build_checkout_pipeline(),
      transitions: build_transition_pipeline(),
    }
  }

  /// Creates a Pending order with one item and one Pending registration per
  /// event. A coupon code is validated and its discount applied to the
  /// price; quota is consumed only on completion.
  #[instrument(name = "OrderLifecycleManager::create_order", skip(self, request), fields(user_id = %request.user_id), err(Display))]
  pub async fn create_order(&self, principal: &Principal, request: NewOrder) -> FulfillmentResult<OrderDetails> {
    self
      .runner
      .run("order.create", || self.create_order_once(principal, request.clone()))
      .await
  }

  async fn create_order_once(&self, principal: &Principal, request: NewOrder) -> FulfillmentResult<OrderDetails> {
    let tx = self.store.begin().await?;
    let mut ctx = CheckoutCtx::new(tx, principal.clone(), request, self.coupons.clone(), self.ledger.clone());
    self.checkout.run(&mut ctx).await?;

    let CheckoutCtx {
      tx,
      order,
      items,
      registrations,
      ..
    } = ctx;
    let order = order.ok_or_else(|| {
      FulfillmentError::from(crate::error::PipelineError::Internal(
        "checkout finished without an order".to_string(),
      ))
    })?;
    tx.commit().await?;
    Ok(OrderDetails {
      order,
      items,
      registrations,
    })
  }

  /// Owner or admin view of an order.
  pub async fn get_order(&self, principal: &Principal, order_id: Uuid) -> FulfillmentResult<OrderDetails> {
    self.runner.run("order.get", || self.get_order_once(principal, order_id)).await
  }

  async fn get_order_once(&self, principal: &Principal, order_id: Uuid) -> FulfillmentResult<OrderDetails> {
    let mut tx = self.store.begin().await?;
    let order = tx.find_order(order_id).await?.ok_or(FulfillmentError::OrderNotFound(order_id))?;
    if !principal.can_act_for(order.user_id) {
      return Err(FulfillmentError::Forbidden(format!("order {} belongs to another user", order_id)));
    }
    let items = tx.order_items(order_id).await?;
    let registrations = self.ledger.for_order(&mut tx, order_id).await?;
    Ok(OrderDetails {
      order,
      items,
      registrations,
    })
  }

  /// Moves `order_id` to `target` and cascades the change, all in one
  /// transaction. Requesting the current status is a successful no-op.
  ///
  /// Refunds are not accepted here: an order is refunded only by approving a
  /// withdrawal, which scopes the refund to that registration.
  #[instrument(name = "OrderLifecycleManager::transition", skip(self, actor), fields(actor_id = %actor.id), err(Display))]
  pub async fn transition(
    &self,
    order_id: Uuid,
    target: OrderStatus,
    actor: &Principal,
  ) -> FulfillmentResult<TransitionOutcome> {
    if target == OrderStatus::Refunded {
      return Err(FulfillmentError::validation(
        "status",
        "refunds are issued by approving a withdrawal request",
      ));
    }
    let command = TransitionCommand {
      order_id,
      target,
      actor: actor.clone(),
      scope: RefundScope::WholeOrder,
    };
    self
      .runner
      .run("order.transition", || self.transition_once(command.clone()))
      .await
  }

  async fn transition_once(&self, command: TransitionCommand) -> FulfillmentResult<TransitionOutcome> {
    let tx = self.store.begin().await?;
    let (tx, outcome) = self.execute(tx, command).await?;
    tx.commit().await?;
    if outcome.changed {
      event!(
        Level::INFO,
        order_id = %outcome.order.id,
        from = %outcome.previous_status,
        to = %outcome.order.status,
        "Order transition committed."
      );
    }
    Ok(outcome)
  }

  /// Runs the transition pipeline inside the caller's transaction and hands
  /// the transaction back. Nothing is committed here.
  pub(crate) async fn execute(
    &self,
    tx: S::Tx,
    command: TransitionCommand,
  ) -> FulfillmentResult<(S::Tx, TransitionOutcome)> {
    let order_id = command.order_id;
    let target = command.target;
    let mut ctx = TransitionCtx::new(tx, command, self.coupons.clone(), self.ledger.clone());

    let result = self.transitions.run(&mut ctx).await;
    let run = match result {
      Ok(run) => run,
      Err(err) if ctx.cascade_started => {
        return Err(FulfillmentError::OrderTransitionFailed {
          order_id,
          target,
          source: Box::new(err),
        })
      }
      Err(err) => return Err(err),
    };

    let TransitionCtx {
      mut tx,
      order,
      previous_status,
      mut coupon_usage,
      mut registrations,
      changed,
      ..
    } = ctx;
    let order = order.ok_or(FulfillmentError::OrderNotFound(order_id))?;
    if run == PipelineResult::Stopped {
      // No-op: report the order's current cascade state.
      coupon_usage = tx.find_coupon_usage_for_order(order_id).await?;
      registrations = self.ledger.for_order(&mut tx, order_id).await?;
    }
    let outcome = TransitionOutcome {
      previous_status: previous_status.unwrap_or(order.status),
      order,
      changed,
      coupon_usage,
      registrations,
    };
    Ok((tx, outcome))
  }
}
