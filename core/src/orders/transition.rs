// core/src/orders/transition.rs

//! The transition pipeline. One run moves one order along one edge of the
//! state machine and cascades into coupon redemption and registrations.
//! Every write goes through the transaction owned by the context.

use chrono::Utc;
use std::sync::Arc;
use tracing::{event, Level};

use crate::coupons::CouponQuotaEngine;
use crate::error::{FulfillmentError, FulfillmentResult, PipelineError};
use crate::models::{CouponUsage, EventRegistration, Order, OrderStatus, RegistrationStatus};
use crate::pipeline::{HandlerFuture, Pipeline, PipelineControl, SkipCondition};
use crate::registrations::RegistrationLedger;
use crate::store::{Store, StoreTx};

use super::{RefundScope, TransitionCommand};

pub(crate) struct TransitionCtx<S: Store> {
  pub tx: S::Tx,
  pub command: TransitionCommand,
  pub coupons: Arc<CouponQuotaEngine<S>>,
  pub ledger: Arc<RegistrationLedger>,

  pub order: Option<Order>,
  pub previous_status: Option<OrderStatus>,
  pub coupon_usage: Option<CouponUsage>,
  pub registrations: Vec<EventRegistration>,
  pub changed: bool,
  /// Set once the transition passed its checks; failures after this point
  /// are reported as a failed transition.
  pub cascade_started: bool,
}

impl<S: Store> TransitionCtx<S> {
  pub fn new(
    tx: S::Tx,
    command: TransitionCommand,
    coupons: Arc<CouponQuotaEngine<S>>,
    ledger: Arc<RegistrationLedger>,
  ) -> Self {
    Self {
      tx,
      command,
      coupons,
      ledger,
      order: None,
      previous_status: None,
      coupon_usage: None,
      registrations: Vec::new(),
      changed: false,
      cascade_started: false,
    }
  }

  fn target(&self) -> OrderStatus {
    self.command.target
  }

  fn order_mut(&mut self) -> FulfillmentResult<&mut Order> {
    self.order.as_mut().ok_or_else(|| {
      FulfillmentError::from(PipelineError::Internal("load_order did not record an order".to_string()))
    })
  }
}

pub(crate) fn build_transition_pipeline<S: Store>() -> Pipeline<TransitionCtx<S>, FulfillmentError> {
  let unless_completing: SkipCondition<TransitionCtx<S>> =
    Arc::new(|ctx: &TransitionCtx<S>| ctx.target() != OrderStatus::Completed);
  let without_coupon: SkipCondition<TransitionCtx<S>> = Arc::new(|ctx: &TransitionCtx<S>| {
    ctx.target() != OrderStatus::Completed || ctx.order.as_ref().map_or(true, |o| o.coupon_id.is_none())
  });
  let when_completing: SkipCondition<TransitionCtx<S>> =
    Arc::new(|ctx: &TransitionCtx<S>| ctx.target() == OrderStatus::Completed);

  let mut p = Pipeline::new(&[
    ("load_order", false, None),
    ("check_transition", false, None),
    ("redeem_coupon", true, Some(without_coupon)),
    ("activate_registrations", false, Some(unless_completing)),
    ("cancel_registrations", false, Some(when_completing)),
    ("update_order_status", false, None),
  ]);

  p.on_root("load_order", load_order::<S>);
  p.on_root("check_transition", check_transition::<S>);
  p.on_root("redeem_coupon", redeem_coupon::<S>);
  p.on_root("activate_registrations", activate_registrations::<S>);
  p.on_root("cancel_registrations", cancel_registrations::<S>);
  p.on_root("update_order_status", update_order_status::<S>);
  p
}

fn load_order<S: Store>(ctx: &mut TransitionCtx<S>) -> HandlerFuture<'_, FulfillmentError> {
  Box::pin(load_order_step(ctx))
}

/// Locks the order row and checks the actor may request the target status.
async fn load_order_step<S: Store>(ctx: &mut TransitionCtx<S>) -> FulfillmentResult<PipelineControl> {
  let order_id = ctx.command.order_id;
  let order = ctx.tx.lock_order(order_id).await?.ok_or(FulfillmentError::OrderNotFound(order_id))?;

  let actor = &ctx.command.actor;
  let allowed = match ctx.target() {
    OrderStatus::Completed | OrderStatus::Pending => actor.is_trusted(),
    OrderStatus::Cancelled => actor.can_act_for(order.user_id),
    OrderStatus::Refunded => actor.is_admin(),
  };
  if !allowed {
    return Err(FulfillmentError::Forbidden(format!(
      "not allowed to move order {} to {}",
      order.id,
      ctx.target()
    )));
  }

  ctx.previous_status = Some(order.status);
  ctx.order = Some(order);
  Ok(PipelineControl::Continue)
}

fn check_transition<S: Store>(ctx: &mut TransitionCtx<S>) -> HandlerFuture<'_, FulfillmentError> {
  Box::pin(check_transition_step(ctx))
}

/// Same status is a successful no-op; an edge outside the table is rejected
/// before anything is written.
async fn check_transition_step<S: Store>(ctx: &mut TransitionCtx<S>) -> FulfillmentResult<PipelineControl> {
  let target = ctx.target();
  let current = ctx.order_mut()?.status;

  if current == target {
    event!(Level::DEBUG, %current, "Order already in target status, nothing to do.");
    return Ok(PipelineControl::Stop);
  }
  if !current.can_transition_to(target) {
    return Err(FulfillmentError::InvalidStateTransition {
      entity: "order",
      from: current.to_string(),
      to: target.to_string(),
    });
  }
  ctx.cascade_started = true;
  Ok(PipelineControl::Continue)
}

fn redeem_coupon<S: Store>(ctx: &mut TransitionCtx<S>) -> HandlerFuture<'_, FulfillmentError> {
  Box::pin(redeem_coupon_step(ctx))
}

/// Consumes the coupon quota and settles the final price on the recorded
/// discount.
async fn redeem_coupon_step<S: Store>(ctx: &mut TransitionCtx<S>) -> FulfillmentResult<PipelineControl> {
  let order = ctx.order_mut()?.clone();
  let Some(coupon_id) = order.coupon_id else {
    return Ok(PipelineControl::Continue);
  };
  let gross = order.gross_cents();
  let redemption = ctx
    .coupons
    .redeem(&mut ctx.tx, order.user_id, coupon_id, order.id, gross)
    .await?;

  let discount_cents = redemption.discount_cents();
  let order = ctx.order_mut()?;
  order.discount_cents = discount_cents;
  order.price_cents = gross - discount_cents;
  ctx.coupon_usage = Some(redemption.usage);
  Ok(PipelineControl::Continue)
}

fn activate_registrations<S: Store>(ctx: &mut TransitionCtx<S>) -> HandlerFuture<'_, FulfillmentError> {
  Box::pin(activate_registrations_step(ctx))
}

/// One Active registration per order item. Items whose registration is
/// missing get one opened first.
async fn activate_registrations_step<S: Store>(ctx: &mut TransitionCtx<S>) -> FulfillmentResult<PipelineControl> {
  let order = ctx.order_mut()?.clone();
  let items = ctx.tx.order_items(order.id).await?;
  let existing = ctx.ledger.for_order(&mut ctx.tx, order.id).await?;

  let mut activated = Vec::with_capacity(items.len());
  for item in items {
    let registration = match existing
      .iter()
      .find(|r| r.event_id == item.event_id && r.status != RegistrationStatus::Cancelled)
    {
      Some(registration) => registration.clone(),
      None => {
        ctx
          .ledger
          .create(&mut ctx.tx, order.user_id, item.event_id, Some(order.id))
          .await?
      }
    };
    activated.push(ctx.ledger.activate(&mut ctx.tx, registration.id).await?);
  }
  ctx.registrations = activated;
  Ok(PipelineControl::Continue)
}

fn cancel_registrations<S: Store>(ctx: &mut TransitionCtx<S>) -> HandlerFuture<'_, FulfillmentError> {
  Box::pin(cancel_registrations_step(ctx))
}

async fn cancel_registrations_step<S: Store>(ctx: &mut TransitionCtx<S>) -> FulfillmentResult<PipelineControl> {
  let order_id = ctx.command.order_id;
  let existing = ctx.ledger.for_order(&mut ctx.tx, order_id).await?;

  let targeted: Vec<_> = match (&ctx.command.scope, ctx.target()) {
    (RefundScope::Registrations(ids), OrderStatus::Refunded) => {
      for id in ids {
        if !existing.iter().any(|r| r.id == *id) {
          return Err(FulfillmentError::RegistrationNotFound(*id));
        }
      }
      ids.clone()
    }
    _ => existing.iter().map(|r| r.id).collect(),
  };

  for registration_id in targeted {
    ctx.ledger.cancel(&mut ctx.tx, registration_id).await?;
  }
  ctx.registrations = ctx.ledger.for_order(&mut ctx.tx, order_id).await?;
  Ok(PipelineControl::Continue)
}

fn update_order_status<S: Store>(ctx: &mut TransitionCtx<S>) -> HandlerFuture<'_, FulfillmentError> {
  Box::pin(update_order_status_step(ctx))
}

/// A scoped refund that leaves Active registrations behind keeps the order
/// Completed.
async fn update_order_status_step<S: Store>(ctx: &mut TransitionCtx<S>) -> FulfillmentResult<PipelineControl> {
  let target = ctx.target();
  let partial_refund = target == OrderStatus::Refunded
    && ctx.registrations.iter().any(|r| r.status == RegistrationStatus::Active);

  let order = ctx.order_mut()?;
  if !partial_refund {
    order.status = target;
  }
  order.updated_at = Utc::now();
  let order = order.clone();
  ctx.tx.update_order(&order).await?;
  ctx.changed = !partial_refund;

  event!(
    Level::INFO,
    order_id = %order.id,
    status = %order.status,
    partial_refund,
    "Order transition applied."
  );
  Ok(PipelineControl::Continue)
}
