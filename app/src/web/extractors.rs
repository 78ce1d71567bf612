// app/src/web/extractors.rs

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use fulfillment::models::{Principal, Role};
use futures_util::future::{ready, Ready};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

/// Caller identity as asserted by the upstream auth layer. A missing role
/// header means a customer.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal(pub Principal);

impl AuthenticatedPrincipal {
  pub fn into_inner(self) -> Principal {
    self.0
  }
}

fn principal_from_headers(req: &HttpRequest) -> Result<Principal, AppError> {
  let id = req
    .headers()
    .get(USER_ID_HEADER)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| Uuid::parse_str(v.trim()).ok())
    .ok_or_else(|| AppError::Auth(format!("Missing or invalid {} header.", USER_ID_HEADER)))?;

  let role = match req.headers().get(USER_ROLE_HEADER) {
    None => Role::Customer,
    Some(value) => value
      .to_str()
      .ok()
      .and_then(|v| v.parse::<Role>().ok())
      .ok_or_else(|| AppError::Auth(format!("Invalid {} header.", USER_ROLE_HEADER)))?,
  };

  Ok(Principal { id, role })
}

impl FromRequest for AuthenticatedPrincipal {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    let result = principal_from_headers(req).map(AuthenticatedPrincipal);
    if let Err(e) = &result {
      warn!(error = %e, "AuthenticatedPrincipal extractor rejected request.");
    }
    ready(result)
  }
}
