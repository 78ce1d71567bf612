// app/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use fulfillment::models::OrderStatus;
use fulfillment::{FulfillmentError, NewOrder, Store};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use super::parse_status;
use crate::errors::AppError;
use crate::state::AppState;
use crate::web::envelope;
use crate::web::extractors::AuthenticatedPrincipal;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemPayload {
  pub event_id: Uuid,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderPayload {
  pub user_id: Uuid,
  pub items: Vec<OrderItemPayload>,
  pub coupon_code: Option<String>,
  pub payment_method: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrderView {
  pub order_id: Uuid,
  pub order_no: String,
  pub status: OrderStatus,
  pub price_cents: i64,
  pub discount_cents: i64,
  pub registration_ids: Vec<Uuid>,
}

#[derive(Deserialize, Debug)]
pub struct StatusPayload {
  pub status: String,
}

#[instrument(
    name = "handler::create_order",
    skip(app_state, payload, principal),
    fields(user_id = %payload.user_id, items = payload.items.len())
)]
pub async fn create_order_handler<S: Store>(
  app_state: web::Data<AppState<S>>,
  principal: AuthenticatedPrincipal,
  payload: web::Json<CreateOrderPayload>,
) -> Result<HttpResponse, AppError> {
  let payload = payload.into_inner();
  let request = NewOrder {
    user_id: payload.user_id,
    event_ids: payload.items.into_iter().map(|item| item.event_id).collect(),
    coupon_code: payload.coupon_code,
    payment_method: payload.payment_method,
  };

  let details = app_state
    .fulfillment
    .orders()
    .create_order(&principal.into_inner(), request)
    .await?;
  info!(order_id = %details.order.id, "Order created.");

  Ok(envelope::created(
    "Order created.",
    CreatedOrderView {
      order_id: details.order.id,
      order_no: details.order.order_no.clone(),
      status: details.order.status,
      price_cents: details.order.price_cents,
      discount_cents: details.order.discount_cents,
      registration_ids: details.registrations.iter().map(|r| r.id).collect(),
    },
  ))
}

#[instrument(name = "handler::get_order", skip(app_state, principal))]
pub async fn get_order_handler<S: Store>(
  app_state: web::Data<AppState<S>>,
  principal: AuthenticatedPrincipal,
  order_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let details = app_state
    .fulfillment
    .orders()
    .get_order(&principal.into_inner(), order_id.into_inner())
    .await?;
  Ok(envelope::ok("Order retrieved.", details))
}

/// Completion (payment confirmation) and cancellation. Refunds only happen
/// through an approved withdrawal.
#[instrument(name = "handler::update_order_status", skip(app_state, principal, payload), fields(status = %payload.status))]
pub async fn update_order_status_handler<S: Store>(
  app_state: web::Data<AppState<S>>,
  principal: AuthenticatedPrincipal,
  order_id: web::Path<Uuid>,
  payload: web::Json<StatusPayload>,
) -> Result<HttpResponse, AppError> {
  let target: OrderStatus = parse_status("status", &payload.status)?;
  if !matches!(target, OrderStatus::Completed | OrderStatus::Cancelled) {
    return Err(FulfillmentError::validation("status", "must be Completed or Cancelled").into());
  }

  let outcome = app_state
    .fulfillment
    .orders()
    .transition(order_id.into_inner(), target, &principal.into_inner())
    .await?;
  app_state.notifier.order_status_changed(&outcome);

  let message = if outcome.changed {
    format!("Order moved from {} to {}.", outcome.previous_status, outcome.order.status)
  } else {
    format!("Order is already {}.", outcome.order.status)
  };
  Ok(envelope::ok(message, outcome))
}
