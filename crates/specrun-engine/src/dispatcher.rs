//! Action dispatch.
//!
//! The dispatcher turns one [`ActionSpec`] into exactly one [`ActionResult`].
//! Nothing an executor does (returning an error, panicking, hanging past its
//! timeout) escapes as an `Err`; it is all recorded on the result.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use specrun_plugin::{
  ActionError, ActionErrorKind, ActionRequest, ActionResult, ExecutionContext, Phase,
  PluginError, PluginRegistry,
};
use specrun_spec::ActionSpec;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::template::resolve_params;

/// Per-action timeout applied when neither the action nor the specification
/// sets one.
pub const DEFAULT_ACTION_TIMEOUT_MS: u64 = 30_000;

/// Resolves executors and invokes them under a timeout.
pub struct ActionDispatcher<'a> {
  registry: &'a PluginRegistry,
  default_timeout: Duration,
}

impl<'a> ActionDispatcher<'a> {
  pub fn new(registry: &'a PluginRegistry, default_timeout: Duration) -> Self {
    Self {
      registry,
      default_timeout,
    }
  }

  /// Run one action and capture its outcome.
  #[instrument(
    name = "dispatch",
    skip(self, task_id, phase, action, ctx),
    fields(
      task_id = %task_id,
      action_id = %action.id,
      action_type = %action.action_type,
      phase = %phase,
    )
  )]
  pub async fn dispatch(
    &self,
    task_id: &str,
    phase: Phase,
    action: &ActionSpec,
    ctx: &ExecutionContext,
  ) -> ActionResult {
    let started_at = Utc::now();
    let start = Instant::now();

    let outcome = self.invoke(task_id, phase, action, ctx).await;
    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let (success, data, error) = match outcome {
      Ok((success, data, message)) => {
        let error = match (success, message) {
          (true, _) => None,
          (false, Some(message)) => Some(ActionError::new(ActionErrorKind::Executor, message)),
          (false, None) => Some(ActionError::new(
            ActionErrorKind::Executor,
            "executor reported failure",
          )),
        };
        (success, data, error)
      }
      Err(error) => (false, serde_json::Value::Null, Some(error)),
    };

    match &error {
      None => debug!(duration_ms, "action succeeded"),
      Some(e) => warn!(duration_ms, kind = ?e.kind, error = %e.message, "action failed"),
    }

    ActionResult {
      action_id: action.id.clone(),
      action_type: action.action_type.clone(),
      phase,
      success,
      started_at,
      duration_ms,
      data,
      error,
    }
  }

  async fn invoke(
    &self,
    task_id: &str,
    phase: Phase,
    action: &ActionSpec,
    ctx: &ExecutionContext,
  ) -> Result<(bool, serde_json::Value, Option<String>), ActionError> {
    let executor = self.registry.executor(&action.action_type).ok_or_else(|| {
      ActionError::new(
        ActionErrorKind::UnknownActionType,
        format!(
          "no executor registered for action type '{}'",
          action.action_type
        ),
      )
    })?;

    let params = resolve_params(&action.params, &ctx.template_scope(task_id))
      .map_err(|message| ActionError::new(ActionErrorKind::InvalidParams, message))?;

    let request = ActionRequest {
      task_id: task_id.to_string(),
      action_id: action.id.clone(),
      phase,
      params,
      is_background: action.is_background,
      cancel: CancellationToken::new(),
    };

    let timeout = action
      .timeout_ms
      .map(Duration::from_millis)
      .unwrap_or(self.default_timeout);

    let call = AssertUnwindSafe(executor.execute(&request, ctx)).catch_unwind();
    match tokio::time::timeout(timeout, call).await {
      Err(_) => {
        request.cancel.cancel();
        Err(ActionError::new(
          ActionErrorKind::Timeout,
          format!("action timed out after {}ms", timeout.as_millis()),
        ))
      }
      Ok(Err(panic)) => Err(ActionError::new(
        ActionErrorKind::Panicked,
        format!("executor panicked: {}", panic_message(panic.as_ref())),
      )),
      Ok(Ok(Err(PluginError::InvalidParams { message }))) => Err(ActionError::new(
        ActionErrorKind::InvalidParams,
        message,
      )),
      Ok(Ok(Err(e))) => Err(ActionError::new(ActionErrorKind::Executor, e.to_string())),
      Ok(Ok(Ok(output))) => Ok((output.success, output.data, output.error)),
    }
  }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = panic.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic payload".to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use serde_json::json;
  use specrun_plugin::{ExecutorOutput, Plugin};
  use std::sync::{Arc, Mutex};

  struct Echo;

  #[async_trait]
  impl specrun_plugin::Executor for Echo {
    fn action_type(&self) -> &str {
      "echo"
    }

    async fn execute(
      &self,
      request: &ActionRequest,
      _ctx: &ExecutionContext,
    ) -> Result<ExecutorOutput, PluginError> {
      Ok(ExecutorOutput::success(serde_json::Value::Object(
        request.params.clone(),
      )))
    }
  }

  type SeenToken = Arc<Mutex<Option<CancellationToken>>>;

  struct Hang {
    seen: SeenToken,
  }

  #[async_trait]
  impl specrun_plugin::Executor for Hang {
    fn action_type(&self) -> &str {
      "hang"
    }

    async fn execute(
      &self,
      request: &ActionRequest,
      _ctx: &ExecutionContext,
    ) -> Result<ExecutorOutput, PluginError> {
      *self.seen.lock().unwrap() = Some(request.cancel.clone());
      tokio::time::sleep(Duration::from_secs(3600)).await;
      Ok(ExecutorOutput::success(json!(null)))
    }
  }

  struct Boom;

  #[async_trait]
  impl specrun_plugin::Executor for Boom {
    fn action_type(&self) -> &str {
      "boom"
    }

    async fn execute(
      &self,
      request: &ActionRequest,
      _ctx: &ExecutionContext,
    ) -> Result<ExecutorOutput, PluginError> {
      match request.str_param("mode")? {
        "panic" => panic!("kaboom"),
        "error" => Err(PluginError::failed("connection refused")),
        _ => Ok(ExecutorOutput {
          success: false,
          data: json!({ "exitCode": 1 }),
          error: None,
        }),
      }
    }
  }

  fn registry(seen: SeenToken) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry.register(Plugin::executor(Echo)).unwrap();
    registry.register(Plugin::executor(Hang { seen })).unwrap();
    registry.register(Plugin::executor(Boom)).unwrap();
    registry
  }

  #[tokio::test]
  async fn test_unknown_action_type_is_a_failed_result() {
    let registry = registry(Arc::default());
    let dispatcher = ActionDispatcher::new(&registry, Duration::from_secs(1));
    let ctx = ExecutionContext::default();

    let result = dispatcher
      .dispatch("T", Phase::Step, &ActionSpec::new("a", "teleport"), &ctx)
      .await;

    assert!(!result.success);
    let error = result.error.unwrap();
    assert_eq!(error.kind, ActionErrorKind::UnknownActionType);
    assert!(error.message.contains("teleport"));
  }

  #[tokio::test]
  async fn test_params_resolved_against_earlier_results() {
    let registry = registry(Arc::default());
    let dispatcher = ActionDispatcher::new(&registry, Duration::from_secs(1));
    let mut ctx = ExecutionContext::default();

    let first = dispatcher
      .dispatch("T", Phase::Step, &ActionSpec::new("create", "echo").param("id", 7), &ctx)
      .await;
    ctx.record("T", first);

    let second = dispatcher
      .dispatch(
        "T",
        Phase::Step,
        &ActionSpec::new("fetch", "echo").param("path", "/users/{{ actions.create.data.id }}"),
        &ctx,
      )
      .await;

    assert!(second.success);
    assert_eq!(second.data["path"], "/users/7");
  }

  #[tokio::test]
  async fn test_bad_template_is_invalid_params() {
    let registry = registry(Arc::default());
    let dispatcher = ActionDispatcher::new(&registry, Duration::from_secs(1));
    let ctx = ExecutionContext::default();

    let result = dispatcher
      .dispatch(
        "T",
        Phase::Step,
        &ActionSpec::new("a", "echo").param("x", "{{ actions.nope.data }}"),
        &ctx,
      )
      .await;

    assert_eq!(result.error.unwrap().kind, ActionErrorKind::InvalidParams);
  }

  #[tokio::test(start_paused = true)]
  async fn test_timeout_cancels_the_action() {
    let seen = SeenToken::default();
    let registry = registry(seen.clone());
    let dispatcher = ActionDispatcher::new(&registry, Duration::from_secs(30));
    let ctx = ExecutionContext::default();

    let result = dispatcher
      .dispatch("T", Phase::Step, &ActionSpec::new("a", "hang").timeout_ms(50), &ctx)
      .await;

    assert!(!result.success);
    assert_eq!(result.error.unwrap().kind, ActionErrorKind::Timeout);
    assert!(result.duration_ms >= 50);

    let token = seen.lock().unwrap().clone().unwrap();
    assert!(token.is_cancelled());
  }

  #[tokio::test]
  async fn test_panic_is_contained() {
    let registry = registry(Arc::default());
    let dispatcher = ActionDispatcher::new(&registry, Duration::from_secs(1));
    let ctx = ExecutionContext::default();

    let result = dispatcher
      .dispatch("T", Phase::Step, &ActionSpec::new("a", "boom").param("mode", "panic"), &ctx)
      .await;

    let error = result.error.unwrap();
    assert_eq!(error.kind, ActionErrorKind::Panicked);
    assert!(error.message.contains("kaboom"));
  }

  #[tokio::test]
  async fn test_executor_errors_and_reported_failures() {
    let registry = registry(Arc::default());
    let dispatcher = ActionDispatcher::new(&registry, Duration::from_secs(1));
    let ctx = ExecutionContext::default();

    let errored = dispatcher
      .dispatch("T", Phase::Step, &ActionSpec::new("a", "boom").param("mode", "error"), &ctx)
      .await;
    let error = errored.error.unwrap();
    assert_eq!(error.kind, ActionErrorKind::Executor);
    assert_eq!(error.message, "connection refused");

    let reported = dispatcher
      .dispatch("T", Phase::Step, &ActionSpec::new("b", "boom").param("mode", "exit"), &ctx)
      .await;
    assert!(!reported.success);
    assert_eq!(reported.data["exitCode"], 1);
    assert_eq!(reported.error.unwrap().kind, ActionErrorKind::Executor);

    let missing = dispatcher
      .dispatch("T", Phase::Step, &ActionSpec::new("c", "boom"), &ctx)
      .await;
    assert_eq!(missing.error.unwrap().kind, ActionErrorKind::InvalidParams);
  }
}
