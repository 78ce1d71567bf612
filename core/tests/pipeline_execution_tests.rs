// tests/pipeline_execution_tests.rs
mod common; // Reference the common module

use common::*;
use fulfillment::pipeline::SkipCondition;
use fulfillment::{Pipeline, PipelineControl, PipelineResult};
use serial_test::serial;
use std::sync::Arc;

#[tokio::test]
#[serial]
async fn test_pipeline_runs_steps_in_order() {
  setup_tracing();
  let mut pipeline =
    Pipeline::<TestContext, TestError>::new(&[("step1", false, None), ("step2", false, None), ("step3", false, None)]);

  pipeline.on_root("step1", create_simple_handler("step1", " S1"));
  pipeline.on_root("step2", create_simple_handler("step2", " S2"));
  pipeline.on_root("step3", create_simple_handler("step3", " S3"));

  let mut ctx = TestContext::default();
  let result = pipeline.run(&mut ctx).await;

  assert_eq!(result.unwrap(), PipelineResult::Completed);
  assert_eq!(ctx.counter, 3);
  assert_eq!(ctx.message, " S1 S2 S3");
  assert_eq!(ctx.steps_executed, vec!["step1", "step2", "step3"]);
}

#[tokio::test]
#[serial]
async fn test_pipeline_stops_on_pipeline_control_stop() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[
    ("stepA", false, None),
    ("stopStep", false, None),
    ("stepC", false, None),
  ]);

  pipeline.on_root("stepA", create_simple_handler("stepA", "A"));
  pipeline.on_root("stopStep", |ctx: &mut TestContext| {
    Box::pin(async move {
      ctx.steps_executed.push("stopStep".to_string());
      Ok(PipelineControl::Stop)
    })
  });
  pipeline.on_root("stepC", create_simple_handler("stepC", "C")); // This should not run

  let mut ctx = TestContext::default();
  let result = pipeline.run(&mut ctx).await;

  assert_eq!(result.unwrap(), PipelineResult::Stopped);
  assert_eq!(ctx.counter, 1);
  assert_eq!(ctx.message, "A");
  assert_eq!(ctx.steps_executed, vec!["stepA", "stopStep"]);
}

#[tokio::test]
#[serial]
async fn test_stop_inside_before_hook_skips_on_handlers() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("guarded", false, None), ("next", false, None)]);
  pipeline.before_root("guarded", create_simple_handler("guard", "G"));
  pipeline.on_root("guarded", create_simple_handler("guarded", "X"));
  pipeline.on_root("next", create_simple_handler("next", "N"));

  let mut ctx = TestContext {
    should_stop_at: Some("guard".to_string()),
    ..Default::default()
  };
  let result = pipeline.run(&mut ctx).await.unwrap();

  assert_eq!(result, PipelineResult::Stopped);
  assert_eq!(ctx.steps_executed, vec!["guard"]);
}

#[tokio::test]
#[serial]
async fn test_pipeline_propagates_handler_error() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[
    ("good_step", false, None),
    ("bad_step", false, None),
    ("another_step", false, None),
  ]);

  pipeline.on_root("good_step", create_simple_handler("good_step", "Good"));
  pipeline.on_root("bad_step", create_failing_handler("bad_step", "I am a bad step!"));
  pipeline.on_root("another_step", create_simple_handler("another_step", "NeverRun"));

  let mut ctx = TestContext::default();
  let result = pipeline.run(&mut ctx).await;

  assert_eq!(result.unwrap_err(), TestError::Handler("I am a bad step!".to_string()));
  assert_eq!(ctx.message, "Good");
  assert_eq!(ctx.steps_executed, vec!["good_step", "bad_step"]);
}

#[tokio::test]
#[serial]
async fn test_pipeline_skips_step_if_condition_met() {
  setup_tracing();
  let skip_when_counted: SkipCondition<TestContext> = Arc::new(|ctx: &TestContext| ctx.counter > 0);
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[
    ("first", false, None),
    ("skipped", false, Some(skip_when_counted)),
    ("last", false, None),
  ]);
  pipeline.on_root("first", create_simple_handler("first", "1"));
  pipeline.on_root("skipped", create_simple_handler("skipped", "S"));
  pipeline.on_root("last", create_simple_handler("last", "L"));

  let mut ctx = TestContext::default();
  pipeline.run(&mut ctx).await.unwrap();

  assert_eq!(ctx.steps_executed, vec!["first", "last"]);
  assert_eq!(ctx.message, "1L");
}

#[tokio::test]
#[serial]
async fn test_non_optional_step_missing_handler_fails() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("present", false, None), ("missing", false, None)]);
  pipeline.on_root("present", create_simple_handler("present", "P"));

  let mut ctx = TestContext::default();
  match pipeline.run(&mut ctx).await {
    Err(TestError::Pipeline(s)) => {
      assert!(s.contains("HandlerMissing"));
      assert!(s.contains("missing"));
    }
    other => panic!("Expected TestError::Pipeline(HandlerMissing), got {:?}", other),
  }
  assert_eq!(ctx.steps_executed, vec!["present"]);
}

#[tokio::test]
#[serial]
async fn test_optional_step_missing_handler_succeeds() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("optional", true, None), ("required", false, None)]);
  pipeline.on_root("required", create_simple_handler("required", "R"));

  let mut ctx = TestContext::default();
  let result = pipeline.run(&mut ctx).await.unwrap();

  assert_eq!(result, PipelineResult::Completed);
  assert_eq!(ctx.steps_executed, vec!["required"]);
}

#[tokio::test]
#[serial]
async fn test_before_on_after_execution_order() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("main", false, None)]);
  pipeline.after_root("main", create_simple_handler("after", "[A]"));
  pipeline.on_root("main", create_simple_handler("on", "[O]"));
  pipeline.before_root("main", create_simple_handler("before1", "[B1]"));
  pipeline.before_root("main", create_simple_handler("before2", "[B2]"));

  let mut ctx = TestContext::default();
  pipeline.run(&mut ctx).await.unwrap();

  assert_eq!(ctx.message, "[B1][B2][O][A]");
  assert_eq!(ctx.steps_executed, vec!["before1", "before2", "on", "after"]);
}

#[test]
#[should_panic(expected = "not found in pipeline definition")]
fn test_registering_handler_for_unknown_step_panics() {
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("only", false, None)]);
  pipeline.on_root("nope", create_simple_handler("nope", ""));
}

#[test]
fn test_step_names_preserve_definition_order() {
  let pipeline = Pipeline::<TestContext, TestError>::new(&[("a", false, None), ("b", true, None), ("c", false, None)]);
  assert_eq!(pipeline.step_names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
}
