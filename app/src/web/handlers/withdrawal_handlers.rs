// app/src/web/handlers/withdrawal_handlers.rs

use actix_web::{web, HttpResponse};
use fulfillment::models::WithdrawalStatus;
use fulfillment::Store;
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use super::parse_status;
use crate::errors::AppError;
use crate::state::AppState;
use crate::web::envelope;
use crate::web::extractors::AuthenticatedPrincipal;

#[derive(Deserialize, Debug)]
pub struct RequestWithdrawalPayload {
  #[serde(rename = "registerID")]
  pub register_id: Uuid,
  pub reason: String,
  pub document: String,
}

#[derive(Deserialize, Debug)]
pub struct DecisionPayload {
  pub status: String,
}

#[derive(Deserialize, Debug)]
pub struct ListQuery {
  pub status: Option<String>,
}

#[instrument(
    name = "handler::request_withdrawal",
    skip(app_state, principal, payload),
    fields(register_id = %payload.register_id)
)]
pub async fn request_withdrawal_handler<S: Store>(
  app_state: web::Data<AppState<S>>,
  principal: AuthenticatedPrincipal,
  payload: web::Json<RequestWithdrawalPayload>,
) -> Result<HttpResponse, AppError> {
  let request = app_state
    .fulfillment
    .withdrawals()
    .request_withdrawal(&principal.into_inner(), payload.register_id, &payload.reason, &payload.document)
    .await?;
  info!(request_id = %request.id, "Withdrawal requested.");
  Ok(envelope::created("Withdrawal request submitted.", request))
}

#[instrument(name = "handler::manage_withdrawal", skip(app_state, principal, payload), fields(status = %payload.status))]
pub async fn manage_withdrawal_handler<S: Store>(
  app_state: web::Data<AppState<S>>,
  principal: AuthenticatedPrincipal,
  request_id: web::Path<Uuid>,
  payload: web::Json<DecisionPayload>,
) -> Result<HttpResponse, AppError> {
  let decision: WithdrawalStatus = parse_status("status", &payload.status)?;
  let result = app_state
    .fulfillment
    .withdrawals()
    .manage(request_id.into_inner(), decision, &principal.into_inner())
    .await?;

  app_state.notifier.withdrawal_reviewed(&result);
  if let Some(refund) = &result.refund {
    app_state.notifier.order_status_changed(refund);
  }
  Ok(envelope::ok(format!("Withdrawal request {}.", result.request.status), result))
}

#[instrument(name = "handler::list_withdrawals", skip(app_state, principal))]
pub async fn list_withdrawals_handler<S: Store>(
  app_state: web::Data<AppState<S>>,
  principal: AuthenticatedPrincipal,
  query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
  let status = query
    .status
    .as_deref()
    .map(|raw| parse_status::<WithdrawalStatus>("status", raw))
    .transpose()?;
  let requests = app_state
    .fulfillment
    .withdrawals()
    .list(&principal.into_inner(), status)
    .await?;
  Ok(envelope::ok(format!("{} withdrawal request(s).", requests.len()), requests))
}
