// app/src/web/envelope.rs

use actix_web::HttpResponse;
use serde::Serialize;

/// Success body shared by every endpoint. Errors use the same shape with an
/// `error` object instead of `data` (see `AppError::error_response`).
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
  pub success: bool,
  pub message: String,
  pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
  pub fn new(message: impl Into<String>, data: T) -> Self {
    Self {
      success: true,
      message: message.into(),
      data,
    }
  }
}

pub fn ok<T: Serialize>(message: impl Into<String>, data: T) -> HttpResponse {
  HttpResponse::Ok().json(ApiResponse::new(message, data))
}

pub fn created<T: Serialize>(message: impl Into<String>, data: T) -> HttpResponse {
  HttpResponse::Created().json(ApiResponse::new(message, data))
}
