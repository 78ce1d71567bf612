// core/src/pipeline/definition.rs

//! Contains the `Pipeline<TData, Err>` struct and its construction.

use crate::error::PipelineError;
use crate::pipeline::step::{Handler, SkipCondition, StepDef};
use std::collections::HashMap;

/// An ordered list of named steps executed against a context of type `TData`.
///
/// `Err` is the error type returned by handlers. It must be constructible
/// from `PipelineError` so that misconfiguration detected at run time (a
/// required step without handlers) surfaces through the same channel.
pub struct Pipeline<TData, Err>
where
  TData: Send + 'static,
  Err: std::error::Error + From<PipelineError> + Send + Sync + 'static,
{
  pub(crate) steps: Vec<StepDef<TData>>,

  pub(crate) before: HashMap<String, Vec<Handler<TData, Err>>>,
  pub(crate) on: HashMap<String, Vec<Handler<TData, Err>>>,
  pub(crate) after: HashMap<String, Vec<Handler<TData, Err>>>,
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: Send + 'static,
  Err: std::error::Error + From<PipelineError> + Send + Sync + 'static,
{
  /// Creates a pipeline from `(name, optional, skip_if)` step definitions.
  pub fn new(step_defs: &[(&str, bool, Option<SkipCondition<TData>>)]) -> Self {
    let steps = step_defs
      .iter()
      .map(|(name, optional, skip_if)| StepDef {
        name: (*name).to_string(),
        optional: *optional,
        skip_if: skip_if.clone(),
      })
      .collect();

    Self {
      steps,
      before: HashMap::new(),
      on: HashMap::new(),
      after: HashMap::new(),
    }
  }

  /// Step names in execution order.
  pub fn step_names(&self) -> impl Iterator<Item = &str> {
    self.steps.iter().map(|s| s.name.as_str())
  }

  /// Panics if `step_name` is not part of this pipeline. Registering a handler
  /// for an unknown step is a wiring mistake, not a runtime condition.
  pub(crate) fn ensure_step_exists(&self, step_name: &str) {
    if !self.steps.iter().any(|s| s.name == step_name) {
      panic!("Pipeline setup error: step '{}' not found in pipeline definition.", step_name);
    }
  }

  pub(crate) fn handlers_for<'p>(
    map: &'p HashMap<String, Vec<Handler<TData, Err>>>,
    step_name: &str,
  ) -> &'p [Handler<TData, Err>] {
    map.get(step_name).map(Vec::as_slice).unwrap_or(&[])
  }
}
