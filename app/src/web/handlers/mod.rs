// app/src/web/handlers/mod.rs

pub mod coupon_handlers;
pub mod order_handlers;
pub mod withdrawal_handlers;

use fulfillment::FulfillmentError;
use std::str::FromStr;

/// Parses a status field from a request body or query, reporting an unknown
/// value as a validation failure on `field`.
pub(crate) fn parse_status<T>(field: &'static str, raw: &str) -> Result<T, FulfillmentError>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  raw.parse::<T>().map_err(|e| FulfillmentError::validation(field, e.to_string()))
}
