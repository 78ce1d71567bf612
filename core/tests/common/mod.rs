// tests/common/mod.rs
#![allow(dead_code)] // Not every test binary uses every helper

use fulfillment::models::{Coupon, Event, OrderStatus, Principal};
use fulfillment::pipeline::{Handler, HandlerFuture};
use fulfillment::{
  Fulfillment, FulfillmentConfig, MemoryStore, NewOrder, OrderDetails, PipelineControl, PipelineError, TransactionConfig,
};
use std::time::Duration;
use tracing::Level;
use uuid::Uuid;

// --- Pipeline engine fixtures ---

#[derive(Clone, Debug, Default)]
pub struct TestContext {
  pub counter: i32,
  pub message: String,
  pub steps_executed: Vec<String>,
  pub should_stop_at: Option<String>,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TestError {
  #[error("Pipeline error: {0}")]
  Pipeline(String),

  #[error("Test handler failed: {0}")]
  Handler(String),
}

impl From<PipelineError> for TestError {
  fn from(pe: PipelineError) -> Self {
    TestError::Pipeline(format!("{:?}", pe))
  }
}

/// Pins a closure to the handler signature so its lifetimes are inferred
/// from the bound.
pub fn handler<F>(f: F) -> Handler<TestContext, TestError>
where
  F: for<'a> Fn(&'a mut TestContext) -> HandlerFuture<'a, TestError> + Send + Sync + 'static,
{
  Box::new(f)
}

pub fn create_simple_handler(step_name: &'static str, message_to_append: &'static str) -> Handler<TestContext, TestError> {
  handler(move |ctx: &mut TestContext| {
    Box::pin(async move {
      ctx.counter += 1;
      ctx.message.push_str(message_to_append);
      ctx.steps_executed.push(step_name.to_string());
      tracing::debug!(target: "test_handlers", step = %step_name, "executed, counter: {}", ctx.counter);
      if ctx.should_stop_at.as_deref() == Some(step_name) {
        return Ok(PipelineControl::Stop);
      }
      Ok(PipelineControl::Continue)
    })
  })
}

pub fn create_failing_handler(step_name: &'static str, error_message: &'static str) -> Handler<TestContext, TestError> {
  handler(move |ctx: &mut TestContext| {
    Box::pin(async move {
      ctx.steps_executed.push(step_name.to_string());
      tracing::warn!(target: "test_handlers", step = %step_name, "failing with: '{}'", error_message);
      Err(TestError::Handler(error_message.to_string()))
    })
  })
}

// --- Helper for Tracing Setup ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Fulfillment fixtures ---

pub fn fast_config() -> FulfillmentConfig {
  FulfillmentConfig {
    transaction: TransactionConfig {
      timeout: Duration::from_secs(2),
      max_transient_retries: 1,
      retry_backoff: Duration::from_millis(1),
    },
    ..FulfillmentConfig::default()
  }
}

pub struct Fixture {
  pub store: MemoryStore,
  pub fulfillment: Fulfillment<MemoryStore>,
  pub customer: Principal,
  pub admin: Principal,
  pub system: Principal,
}

impl Fixture {
  pub fn new() -> Self {
    Self::with_config(fast_config())
  }

  pub fn with_config(config: FulfillmentConfig) -> Self {
    setup_tracing();
    let store = MemoryStore::new();
    Self {
      fulfillment: Fulfillment::new(store.clone(), config),
      store,
      customer: Principal::customer(Uuid::new_v4()),
      admin: Principal::admin(Uuid::new_v4()),
      system: Principal::system(),
    }
  }

  pub fn seed_event(&self, title: &str, price_cents: i64) -> Event {
    let event = Event::new(title, price_cents);
    self.store.insert_event(event.clone());
    event
  }

  pub fn seed_events(&self, count: usize, price_cents: i64) -> Vec<Event> {
    (1..=count).map(|n| self.seed_event(&format!("Event {}", n), price_cents)).collect()
  }

  pub fn seed_coupon(&self, coupon: Coupon) -> Coupon {
    self.store.insert_coupon(coupon.clone());
    coupon
  }

  pub fn new_order(&self, events: &[Event], coupon_code: Option<&str>) -> NewOrder {
    NewOrder {
      user_id: self.customer.id,
      event_ids: events.iter().map(|e| e.id).collect(),
      coupon_code: coupon_code.map(str::to_string),
      payment_method: "card".to_string(),
    }
  }

  /// Creates a Pending order for the fixture's customer.
  pub async fn place_order(&self, events: &[Event], coupon_code: Option<&str>) -> OrderDetails {
    self
      .fulfillment
      .orders()
      .create_order(&self.customer, self.new_order(events, coupon_code))
      .await
      .expect("order creation should succeed")
  }

  /// Creates an order and completes it as the payment system.
  pub async fn completed_order(&self, events: &[Event], coupon_code: Option<&str>) -> OrderDetails {
    let details = self.place_order(events, coupon_code).await;
    self
      .fulfillment
      .orders()
      .transition(details.order.id, OrderStatus::Completed, &self.system)
      .await
      .expect("completion should succeed");
    self
      .fulfillment
      .orders()
      .get_order(&self.customer, details.order.id)
      .await
      .expect("order should be readable")
  }
}
