// app/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use fulfillment::{DocumentConfig, FulfillmentConfig, TransactionConfig};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub database_url: String,

  /// Prefix for generated invoice and receipt URLs.
  pub document_base_url: String,

  pub txn_timeout: Duration,
  pub txn_max_retries: u32,
  pub txn_retry_backoff: Duration,

  pub notify_sender: String,

  pub run_migrations: bool,
}

fn parse_env<T>(var_name: &str, default: &str) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  env::var(var_name)
    .unwrap_or_else(|_| default.to_string())
    .parse::<T>()
    .map_err(|e| AppError::Config(format!("Invalid {}: {}", var_name, e)))
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present

    let get_env = |var_name: &str| {
      env::var(var_name).map_err(|e| AppError::Config(format!("Missing environment variable '{}': {}", var_name, e)))
    };

    let server_host = get_env("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let server_port = parse_env::<u16>("SERVER_PORT", "8080")?;
    let database_url = get_env("DATABASE_URL")?;
    let document_base_url =
      get_env("DOCUMENT_BASE_URL").unwrap_or_else(|_| DocumentConfig::default().base_url);

    let txn_timeout = Duration::from_millis(parse_env::<u64>("TXN_TIMEOUT_MS", "5000")?);
    let txn_max_retries = parse_env::<u32>("TXN_MAX_RETRIES", "1")?;
    let txn_retry_backoff = Duration::from_millis(parse_env::<u64>("TXN_RETRY_BACKOFF_MS", "50")?);

    let notify_sender = get_env("NOTIFY_SENDER").unwrap_or_else(|_| "noreply@tickets.local".to_string());
    let run_migrations = parse_env::<bool>("RUN_MIGRATIONS", "true")?;

    tracing::info!("Application configuration loaded successfully.");

    Ok(Self {
      server_host,
      server_port,
      database_url,
      document_base_url,
      txn_timeout,
      txn_max_retries,
      txn_retry_backoff,
      notify_sender,
      run_migrations,
    })
  }

  pub fn fulfillment(&self) -> FulfillmentConfig {
    FulfillmentConfig {
      transaction: TransactionConfig {
        timeout: self.txn_timeout,
        max_transient_retries: self.txn_max_retries,
        retry_backoff: self.txn_retry_backoff,
      },
      documents: DocumentConfig {
        base_url: self.document_base_url.clone(),
      },
    }
  }
}
