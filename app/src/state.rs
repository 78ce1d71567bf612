// app/src/state.rs
use crate::services::notifier::Notifier;
use fulfillment::{Fulfillment, Store};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState<S: Store> {
  pub fulfillment: Arc<Fulfillment<S>>,
  pub notifier: Notifier,
}

impl<S: Store> AppState<S> {
  pub fn new(fulfillment: Fulfillment<S>, notifier: Notifier) -> Self {
    Self {
      fulfillment: Arc::new(fulfillment),
      notifier,
    }
  }
}
