// core/src/pipeline/step.rs

//! Step definitions, handler signatures and flow-control signals for the
//! step pipeline.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Signal from a handler indicating whether the pipeline should continue or stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineControl {
  /// Continue with the remaining handlers of this step and the following steps.
  Continue,
  /// Halt the pipeline immediately. Nothing after the current handler runs.
  Stop,
}

/// Outcome of a full pipeline execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineResult {
  /// Every non-skipped step ran to completion.
  Completed,
  /// A handler returned `PipelineControl::Stop`.
  Stopped,
}

/// Future returned by a step handler. It borrows the pipeline context mutably
/// for `'a`, so a handler may hold the context (and the transaction inside it)
/// across `.await` points.
pub type HandlerFuture<'a, Err> = Pin<Box<dyn Future<Output = Result<PipelineControl, Err>> + Send + 'a>>;

/// A registered step handler.
///
/// Handlers receive exclusive access to the context for the duration of their
/// future; steps therefore never observe a context that another handler is
/// still mutating.
pub type Handler<TData, Err> = Box<dyn for<'a> Fn(&'a mut TData) -> HandlerFuture<'a, Err> + Send + Sync>;

/// Evaluated before a step runs. Returning `true` skips the step.
pub type SkipCondition<TData> = Arc<dyn Fn(&TData) -> bool + Send + Sync + 'static>;

/// Definition of a pipeline step: its name, optionality and skip condition.
#[derive(Clone)]
pub struct StepDef<TData: 'static> {
  pub name: String,
  /// An optional step with no handlers is silently passed over; a required
  /// one fails the run with `PipelineError::HandlerMissing`.
  pub optional: bool,
  pub skip_if: Option<SkipCondition<TData>>,
}

impl<TData: 'static> std::fmt::Debug for StepDef<TData> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StepDef")
      .field("name", &self.name)
      .field("optional", &self.optional)
      .field("skip_if_present", &self.skip_if.is_some())
      .finish()
  }
}
