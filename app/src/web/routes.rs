// app/src/web/routes.rs

use actix_web::{web, HttpResponse};
use fulfillment::Store;

use crate::errors::AppError;
use crate::web::handlers::{coupon_handlers, order_handlers, withdrawal_handlers};

async fn health_check_handler() -> HttpResponse {
  HttpResponse::Ok().json(serde_json::json!({ "success": true, "message": "ok", "data": { "status": "ok" } }))
}

/// Registers every route under `/api`. Malformed JSON bodies and query
/// strings are reported through `AppError::Validation`.
pub fn configure_app_routes<S: Store>(cfg: &mut web::ServiceConfig) {
  cfg
    .app_data(web::JsonConfig::default().error_handler(|err, _req| AppError::Validation(err.to_string()).into()))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| AppError::Validation(err.to_string()).into()))
    .service(
      web::scope("/api")
        .route("/health", web::get().to(health_check_handler))
        .service(
          web::scope("/coupons").route(
            "/validate",
            web::post().to(coupon_handlers::validate_coupon_handler::<S>),
          ),
        )
        .service(
          web::scope("/orders")
            .route("", web::post().to(order_handlers::create_order_handler::<S>))
            .route("/{order_id}", web::get().to(order_handlers::get_order_handler::<S>))
            .route(
              "/{order_id}/status",
              web::patch().to(order_handlers::update_order_status_handler::<S>),
            ),
        )
        .service(
          web::scope("/withdrawals")
            .route("", web::get().to(withdrawal_handlers::list_withdrawals_handler::<S>))
            .route(
              "/request",
              web::post().to(withdrawal_handlers::request_withdrawal_handler::<S>),
            )
            .route(
              "/manage/{request_id}",
              web::patch().to(withdrawal_handlers::manage_withdrawal_handler::<S>),
            ),
        ),
    );
}
