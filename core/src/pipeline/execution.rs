// core/src/pipeline/execution.rs

//! Contains `Pipeline::run()`, which executes steps in order against one
//! exclusively borrowed context.

use crate::error::PipelineError;
use crate::pipeline::definition::Pipeline;
use crate::pipeline::step::{PipelineControl, PipelineResult};
use tracing::{event, instrument, span, Instrument, Level};

impl<TData, Err> Pipeline<TData, Err>
where
  TData: Send + 'static,
  Err: std::error::Error + From<PipelineError> + Send + Sync + 'static,
{
  /// Executes every step against `ctx`.
  ///
  /// For each step: the skip condition is evaluated first; then `before`,
  /// `on` and `after` handlers run in registration order. The first handler
  /// error aborts the run and is returned unchanged; a `Stop` signal ends the
  /// run with `PipelineResult::Stopped`. A required step without any handler
  /// fails with `PipelineError::HandlerMissing` converted into `Err`.
  #[instrument(
    name = "Pipeline::run",
    skip_all,
    fields(
      pipeline_context_type = %std::any::type_name::<TData>(),
      num_steps = self.steps.len(),
    ),
    err(Display)
  )]
  pub async fn run(&self, ctx: &mut TData) -> Result<PipelineResult, Err> {
    event!(Level::DEBUG, "Pipeline execution starting.");

    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_name = step_def.name.as_str();
      let step_span = span!(
        Level::INFO,
        "pipeline_step",
        step_name = step_name,
        step_index = step_idx,
        optional = step_def.optional
      );

      // Skip conditions see the context as left by the previous steps.
      if let Some(skip_if) = &step_def.skip_if {
        if skip_if(&*ctx) {
          event!(parent: &step_span, Level::DEBUG, "Step skipped due to its skip condition.");
          continue;
        }
      }

      let before = Self::handlers_for(&self.before, step_name);
      let on = Self::handlers_for(&self.on, step_name);
      let after = Self::handlers_for(&self.after, step_name);

      // A step with nothing registered is either passed over or a wiring error.
      if before.is_empty() && on.is_empty() && after.is_empty() {
        if step_def.optional {
          event!(parent: &step_span, Level::DEBUG, "Optional step has no handlers, skipping.");
          continue;
        }
        event!(parent: &step_span, Level::ERROR, "Required step has no handlers.");
        return Err(Err::from(PipelineError::HandlerMissing {
          step_name: step_def.name.clone(),
        }));
      }

      // Phases run strictly in order; each handler gets the context exclusively
      // for the whole of its future.
      for (phase, handlers) in [("before", before), ("on", on), ("after", after)] {
        for (handler_idx, handler_fn) in handlers.iter().enumerate() {
          let handler_span = span!(
            parent: &step_span,
            Level::DEBUG,
            "step_handler",
            phase = phase,
            handler_index = handler_idx
          );
          match handler_fn(&mut *ctx).instrument(handler_span).await {
            Ok(PipelineControl::Continue) => {}
            Ok(PipelineControl::Stop) => {
              event!(parent: &step_span, Level::INFO, phase = phase, "Pipeline stopped by a handler.");
              return Ok(PipelineResult::Stopped);
            }
            Err(e) => {
              event!(parent: &step_span, Level::WARN, phase = phase, error = %e, "Step handler failed.");
              return Err(e);
            }
          }
        }
      }
      event!(parent: &step_span, Level::DEBUG, "Step finished.");
    }

    event!(Level::DEBUG, "Pipeline execution completed.");
    Ok(PipelineResult::Completed)
  }
}
