// core/src/txn.rs

//! Runs a unit of work as a bounded, retried transaction attempt.

use std::future::Future;
use tracing::{event, Level};

use crate::config::TransactionConfig;
use crate::error::{FulfillmentError, FulfillmentResult};

#[derive(Debug, Clone)]
pub struct TransactionRunner {
  config: TransactionConfig,
}

impl TransactionRunner {
  pub fn new(config: TransactionConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &TransactionConfig {
    &self.config
  }

  /// Runs `attempt` until it succeeds, fails permanently, or runs out of
  /// transient retries.
  ///
  /// Each call of `attempt` must begin and commit its own transaction. An
  /// attempt that exceeds the timeout is dropped, which rolls its
  /// transaction back, and `TransactionTimeout` is returned without retry.
  pub async fn run<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> FulfillmentResult<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = FulfillmentResult<T>>,
  {
    let mut retries = 0u32;
    loop {
      let outcome = match tokio::time::timeout(self.config.timeout, attempt()).await {
        Ok(outcome) => outcome,
        Err(_) => {
          event!(
            Level::WARN,
            operation,
            timeout_ms = self.config.timeout.as_millis() as u64,
            "Transaction timed out and was rolled back."
          );
          return Err(FulfillmentError::TransactionTimeout {
            timeout: self.config.timeout,
          });
        }
      };

      match outcome {
        Err(err) if err.is_transient() && retries < self.config.max_transient_retries => {
          retries += 1;
          event!(Level::WARN, operation, retry = retries, error = %err, "Transient failure, retrying transaction.");
          tokio::time::sleep(self.config.retry_backoff * retries).await;
        }
        other => return other,
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::StoreError;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  fn runner(max_retries: u32) -> TransactionRunner {
    TransactionRunner::new(TransactionConfig {
      timeout: Duration::from_millis(100),
      max_transient_retries: max_retries,
      retry_backoff: Duration::from_millis(1),
    })
  }

  #[tokio::test]
  async fn transient_failure_is_retried_once() {
    let calls = &AtomicUsize::new(0);
    let result = runner(1)
      .run("test", move || async move {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
          Err(StoreError::Transient("deadlock".into()).into())
        } else {
          Ok(7)
        }
      })
      .await;
    assert_eq!(result.unwrap(), 7);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn retries_are_bounded() {
    let calls = &AtomicUsize::new(0);
    let result: FulfillmentResult<()> = runner(1)
      .run("test", move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Transient("deadlock".into()).into())
      })
      .await;
    assert!(result.unwrap_err().is_transient());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn permanent_failure_is_not_retried() {
    let calls = &AtomicUsize::new(0);
    let result: FulfillmentResult<()> = runner(3)
      .run("test", move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(FulfillmentError::validation("code", "must not be empty"))
      })
      .await;
    assert!(matches!(result, Err(FulfillmentError::Validation { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn slow_attempt_times_out() {
    let result: FulfillmentResult<()> = runner(1)
      .run("test", || async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
      })
      .await;
    assert!(matches!(result, Err(FulfillmentError::TransactionTimeout { .. })));
  }
}
