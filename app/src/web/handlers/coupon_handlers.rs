// app/src/web/handlers/coupon_handlers.rs

use actix_web::{web, HttpResponse};
use fulfillment::{FulfillmentError, Store};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::envelope;
use crate::web::extractors::AuthenticatedPrincipal;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCouponPayload {
  pub code: String,
  pub user_id: Uuid,
  pub order_amount_cents: i64,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CouponQuoteView {
  pub coupon_id: Uuid,
  pub code: String,
  pub discount_cents: i64,
  pub final_amount_cents: i64,
}

#[instrument(
    name = "handler::validate_coupon",
    skip(app_state, payload, principal),
    fields(code = %payload.code, user_id = %payload.user_id)
)]
pub async fn validate_coupon_handler<S: Store>(
  app_state: web::Data<AppState<S>>,
  principal: AuthenticatedPrincipal,
  payload: web::Json<ValidateCouponPayload>,
) -> Result<HttpResponse, AppError> {
  let principal = principal.into_inner();
  if !principal.can_act_for(payload.user_id) {
    return Err(FulfillmentError::Forbidden("cannot validate coupons for another user".to_string()).into());
  }

  let quote = app_state
    .fulfillment
    .coupons()
    .validate(&payload.code, payload.user_id, payload.order_amount_cents)
    .await?;
  info!(discount_cents = quote.discount_cents, "Coupon validated.");

  Ok(envelope::ok(
    "Coupon is valid.",
    CouponQuoteView {
      coupon_id: quote.coupon.id,
      code: quote.coupon.code,
      discount_cents: quote.discount_cents,
      final_amount_cents: quote.final_amount_cents,
    },
  ))
}
