// app/src/lib.rs

//! HTTP surface of the ticketing fulfillment service: actix-web handlers over
//! the `fulfillment` core, backed by PostgreSQL in production.

pub mod config;
pub mod db;
pub mod errors;
pub mod services;
pub mod state;
pub mod web;
