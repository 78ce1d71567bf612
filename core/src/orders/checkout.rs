// core/src/orders/checkout.rs

//! The checkout pipeline: turns a validated cart into a Pending order with
//! its items and Pending registrations, inside one transaction.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{event, Level};
use uuid::Uuid;

use crate::coupons::CouponQuotaEngine;
use crate::error::{FulfillmentError, FulfillmentResult};
use crate::models::{DiscountQuote, Event, EventRegistration, Order, OrderItem, OrderStatus, Principal};
use crate::pipeline::{HandlerFuture, Pipeline, PipelineControl, SkipCondition};
use crate::registrations::RegistrationLedger;
use crate::store::{Store, StoreTx};

use super::NewOrder;

pub(crate) struct CheckoutCtx<S: Store> {
  pub tx: S::Tx,
  pub principal: Principal,
  pub request: NewOrder,
  pub coupons: Arc<CouponQuotaEngine<S>>,
  pub ledger: Arc<RegistrationLedger>,

  pub events: Vec<Event>,
  pub gross_cents: i64,
  pub quote: Option<DiscountQuote>,
  pub order: Option<Order>,
  pub items: Vec<OrderItem>,
  pub registrations: Vec<EventRegistration>,
}

impl<S: Store> CheckoutCtx<S> {
  pub fn new(
    tx: S::Tx,
    principal: Principal,
    request: NewOrder,
    coupons: Arc<CouponQuotaEngine<S>>,
    ledger: Arc<RegistrationLedger>,
  ) -> Self {
    Self {
      tx,
      principal,
      request,
      coupons,
      ledger,
      events: Vec::new(),
      gross_cents: 0,
      quote: None,
      order: None,
      items: Vec::new(),
      registrations: Vec::new(),
    }
  }

  fn coupon_code(&self) -> Option<&str> {
    self.request.coupon_code.as_deref().map(str::trim).filter(|c| !c.is_empty())
  }
}

pub(crate) fn build_checkout_pipeline<S: Store>() -> Pipeline<CheckoutCtx<S>, FulfillmentError> {
  let no_coupon: SkipCondition<CheckoutCtx<S>> = Arc::new(|ctx: &CheckoutCtx<S>| ctx.coupon_code().is_none());

  let mut p = Pipeline::new(&[
    ("validate_request", false, None),
    ("price_items", false, None),
    ("apply_coupon", true, Some(no_coupon)),
    ("insert_order", false, None),
    ("open_registrations", false, None),
  ]);

  p.on_root("validate_request", validate_request::<S>);
  p.on_root("price_items", price_items::<S>);
  p.on_root("apply_coupon", apply_coupon::<S>);
  p.after_root("apply_coupon", check_discount_bounds::<S>);
  p.on_root("insert_order", insert_order::<S>);
  p.on_root("open_registrations", open_registrations::<S>);
  p
}

fn validate_request<S: Store>(ctx: &mut CheckoutCtx<S>) -> HandlerFuture<'_, FulfillmentError> {
  Box::pin(async move {
    let request = &ctx.request;
    if !ctx.principal.can_act_for(request.user_id) {
      return Err(FulfillmentError::Forbidden(
        "orders can only be placed for your own account".to_string(),
      ));
    }
    if request.event_ids.is_empty() {
      return Err(FulfillmentError::validation("items", "at least one event is required"));
    }
    let mut seen = HashSet::new();
    if let Some(dup) = request.event_ids.iter().find(|id| !seen.insert(**id)) {
      return Err(FulfillmentError::validation(
        "items",
        format!("event {} appears more than once", dup),
      ));
    }
    if request.payment_method.trim().is_empty() {
      return Err(FulfillmentError::validation("paymentMethod", "must not be empty"));
    }
    Ok(PipelineControl::Continue)
  })
}

fn price_items<S: Store>(ctx: &mut CheckoutCtx<S>) -> HandlerFuture<'_, FulfillmentError> {
  Box::pin(price_items_step(ctx))
}

async fn price_items_step<S: Store>(ctx: &mut CheckoutCtx<S>) -> FulfillmentResult<PipelineControl> {
  for event_id in ctx.request.event_ids.clone() {
    let event = ctx.tx.find_event(event_id).await?.ok_or(FulfillmentError::EventNotFound(event_id))?;
    ctx.gross_cents = ctx
      .gross_cents
      .checked_add(event.price_cents)
      .ok_or_else(|| FulfillmentError::validation("items", "order total is out of range"))?;
    ctx.events.push(event);
  }
  Ok(PipelineControl::Continue)
}

fn apply_coupon<S: Store>(ctx: &mut CheckoutCtx<S>) -> HandlerFuture<'_, FulfillmentError> {
  Box::pin(apply_coupon_step(ctx))
}

/// Previews the discount. Quota is only consumed when the order completes.
async fn apply_coupon_step<S: Store>(ctx: &mut CheckoutCtx<S>) -> FulfillmentResult<PipelineControl> {
  let Some(code) = ctx.coupon_code().map(str::to_string) else {
    return Ok(PipelineControl::Continue);
  };
  let quote = ctx
    .coupons
    .validate_in(&mut ctx.tx, &code, ctx.request.user_id, ctx.gross_cents)
    .await?;
  ctx.quote = Some(quote);
  Ok(PipelineControl::Continue)
}

fn check_discount_bounds<S: Store>(ctx: &mut CheckoutCtx<S>) -> HandlerFuture<'_, FulfillmentError> {
  Box::pin(async move {
    if let Some(quote) = &ctx.quote {
      if quote.discount_cents < 0 || quote.discount_cents > ctx.gross_cents {
        return Err(FulfillmentError::validation("couponCode", "discount exceeds the order amount"));
      }
    }
    Ok(PipelineControl::Continue)
  })
}

fn insert_order<S: Store>(ctx: &mut CheckoutCtx<S>) -> HandlerFuture<'_, FulfillmentError> {
  Box::pin(insert_order_step(ctx))
}

async fn insert_order_step<S: Store>(ctx: &mut CheckoutCtx<S>) -> FulfillmentResult<PipelineControl> {
  let now = Utc::now();
  let id = Uuid::new_v4();
  let discount_cents = ctx.quote.as_ref().map_or(0, |q| q.discount_cents);
  let order = Order {
    id,
    user_id: ctx.request.user_id,
    order_no: Order::order_number_for(id, now),
    status: OrderStatus::Pending,
    price_cents: ctx.gross_cents - discount_cents,
    payment_method: ctx.request.payment_method.trim().to_string(),
    discount_cents,
    coupon_id: ctx.quote.as_ref().map(|q| q.coupon.id),
    created_at: now,
    updated_at: now,
  };
  ctx.tx.insert_order(&order).await?;

  for (idx, event) in ctx.events.iter().enumerate() {
    let item = OrderItem {
      id: Uuid::new_v4(),
      order_id: order.id,
      event_id: event.id,
      line_no: idx as i32 + 1,
      price_cents: event.price_cents,
    };
    ctx.tx.insert_order_item(&item).await?;
    ctx.items.push(item);
  }

  event!(Level::INFO, order_id = %order.id, order_no = %order.order_no, price_cents = order.price_cents, "Order created.");
  ctx.order = Some(order);
  Ok(PipelineControl::Continue)
}

fn open_registrations<S: Store>(ctx: &mut CheckoutCtx<S>) -> HandlerFuture<'_, FulfillmentError> {
  Box::pin(open_registrations_step(ctx))
}

async fn open_registrations_step<S: Store>(ctx: &mut CheckoutCtx<S>) -> FulfillmentResult<PipelineControl> {
  let order_id = ctx
    .order
    .as_ref()
    .map(|o| o.id)
    .ok_or_else(|| FulfillmentError::Pipeline {
      source: crate::error::PipelineError::Internal("insert_order did not record an order".to_string()),
    })?;
  for item in &ctx.items {
    let registration = ctx
      .ledger
      .create(&mut ctx.tx, ctx.request.user_id, item.event_id, Some(order_id))
      .await?;
    ctx.registrations.push(registration);
  }
  Ok(PipelineControl::Continue)
}
