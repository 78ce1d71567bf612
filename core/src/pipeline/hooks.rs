// core/src/pipeline/hooks.rs

//! Registration of `before`, `on` and `after` handlers for pipeline steps.
//!
//! Handlers are plain functions or closures of the shape
//! `for<'a> Fn(&'a mut TData) -> HandlerFuture<'a, Err>`. A typical handler
//! delegates to an `async fn` taking `&mut TData`:
//!
//! ```ignore
//! fn load_order<S: Store>(ctx: &mut TransitionCtx<S>) -> HandlerFuture<'_, FulfillmentError> {
//!   Box::pin(load_order_step(ctx))
//! }
//! ```

use crate::error::PipelineError;
use crate::pipeline::definition::Pipeline;
use crate::pipeline::step::HandlerFuture;
use tracing::{event, Level};

impl<TData, Err> Pipeline<TData, Err>
where
  TData: Send + 'static,
  Err: std::error::Error + From<PipelineError> + Send + Sync + 'static,
{
  /// Registers a handler that runs before the step's `on` handlers.
  ///
  /// # Panics
  /// If `step_name` is not a step of this pipeline.
  pub fn before_root<H>(&mut self, step_name: &str, handler: H)
  where
    H: for<'a> Fn(&'a mut TData) -> HandlerFuture<'a, Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    self.before.entry(step_name.to_string()).or_default().push(Box::new(handler));
    event!(Level::TRACE, %step_name, "before handler registered.");
  }

  /// Registers the main handler(s) of a step.
  ///
  /// # Panics
  /// If `step_name` is not a step of this pipeline.
  pub fn on_root<H>(&mut self, step_name: &str, handler: H)
  where
    H: for<'a> Fn(&'a mut TData) -> HandlerFuture<'a, Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    self.on.entry(step_name.to_string()).or_default().push(Box::new(handler));
    event!(Level::TRACE, %step_name, "on handler registered.");
  }

  /// Registers a handler that runs after the step's `on` handlers.
  ///
  /// # Panics
  /// If `step_name` is not a step of this pipeline.
  pub fn after_root<H>(&mut self, step_name: &str, handler: H)
  where
    H: for<'a> Fn(&'a mut TData) -> HandlerFuture<'a, Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    self.after.entry(step_name.to_string()).or_default().push(Box::new(handler));
    event!(Level::TRACE, %step_name, "after handler registered.");
  }
}
