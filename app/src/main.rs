// app/src/main.rs

use actix_web::{web, App, HttpServer};
use fulfillment::Fulfillment;
use std::io;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use ticketing_app::config::AppConfig;
use ticketing_app::db::{self, PgStore};
use ticketing_app::services::notifier::Notifier;
use ticketing_app::state::AppState;
use ticketing_app::web::configure_app_routes;

#[actix_web::main]
async fn main() -> io::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_span_events(FmtSpan::CLOSE)
    .init();

  tracing::info!("Starting ticketing fulfillment server...");

  let app_config = AppConfig::from_env().map_err(|e| {
    tracing::error!(error = %e, "Failed to load application configuration.");
    io::Error::other(e.to_string())
  })?;

  let pool = db::connect(&app_config).await.map_err(|e| {
    tracing::error!(error = %e, "Database setup failed.");
    io::Error::other(e.to_string())
  })?;

  let fulfillment = Fulfillment::new(PgStore::new(pool), app_config.fulfillment());
  let app_state = web::Data::new(AppState::new(fulfillment, Notifier::new(app_config.notify_sender.clone())));

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Binding server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(app_state.clone())
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(configure_app_routes::<PgStore>)
  })
  .bind(&server_address)?
  .run()
  .await
}
