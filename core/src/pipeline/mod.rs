// core/src/pipeline/mod.rs

//! A small named-step pipeline used to express multi-step commands (checkout,
//! order transitions) as an ordered list of steps with `before`/`on`/`after`
//! handlers, all executing against one exclusively borrowed context.

pub mod definition;
pub mod execution;
pub mod hooks;
pub mod step;

pub use definition::Pipeline;
pub use step::{Handler, HandlerFuture, PipelineControl, PipelineResult, SkipCondition, StepDef};
