// app/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use fulfillment::{ErrorKind, FulfillmentError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("{source}")]
  Fulfillment {
    #[from]
    source: FulfillmentError,
  },

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl AppError {
  fn code(&self) -> &'static str {
    match self {
      AppError::Validation(_) => "VALIDATION_ERROR",
      AppError::Auth(_) => "UNAUTHENTICATED",
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Internal(_) => "INTERNAL",
      AppError::Fulfillment { source } => source.code(),
    }
  }

  /// Client-facing detail. Internal causes are logged, never echoed.
  fn detail(&self) -> String {
    match self {
      AppError::Validation(m) | AppError::Auth(m) => m.clone(),
      AppError::Fulfillment { source } if source.kind() != ErrorKind::Internal => source.to_string(),
      AppError::Fulfillment { source } if source.code() == "TRANSACTION_TIMEOUT" => source.to_string(),
      _ => "An internal error occurred".to_string(),
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) => StatusCode::BAD_REQUEST,
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
      AppError::Fulfillment { source } => match source.root_cause() {
        FulfillmentError::TransactionTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => match source.kind() {
          ErrorKind::Validation => StatusCode::BAD_REQUEST,
          ErrorKind::NotFound => StatusCode::NOT_FOUND,
          ErrorKind::Conflict => StatusCode::CONFLICT,
          ErrorKind::Forbidden => StatusCode::FORBIDDEN,
          ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        },
      },
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with error");
    } else {
      tracing::warn!(application_error = %self, "Request rejected");
    }

    let kind = match self {
      AppError::Fulfillment { source } => source.kind(),
      AppError::Validation(_) => ErrorKind::Validation,
      AppError::Auth(_) => ErrorKind::Forbidden,
      _ => ErrorKind::Internal,
    };
    HttpResponse::build(status).json(json!({
      "success": false,
      "message": self.detail(),
      "error": {
        "kind": kind,
        "code": self.code(),
        "detail": self.detail(),
      }
    }))
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
