use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use specrun_plugin::{ActionRequest, ExecutionContext, Executor, ExecutorOutput, PluginError};

use crate::params;

/// Waits `params.ms` milliseconds.
pub struct SleepExecutor;

#[async_trait]
impl Executor for SleepExecutor {
  fn action_type(&self) -> &str {
    "sleep"
  }

  async fn execute(
    &self,
    request: &ActionRequest,
    _ctx: &ExecutionContext,
  ) -> Result<ExecutorOutput, PluginError> {
    let ms = request
      .u64_param("ms")?
      .ok_or_else(|| PluginError::invalid_params("missing 'ms'"))?;
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Ok(ExecutorOutput::success(json!({ "sleptMs": ms })))
  }
}

/// Returns `params.data`, or the whole parameter bag, as its output.
///
/// `params.fail: true` turns it into a failure with `params.error`.
pub struct EchoExecutor;

#[async_trait]
impl Executor for EchoExecutor {
  fn action_type(&self) -> &str {
    "echo"
  }

  async fn execute(
    &self,
    request: &ActionRequest,
    _ctx: &ExecutionContext,
  ) -> Result<ExecutorOutput, PluginError> {
    let data = request
      .param("data")
      .cloned()
      .unwrap_or_else(|| serde_json::Value::Object(request.params.clone()));

    let fail = match request.param("fail") {
      None | Some(serde_json::Value::Null) => false,
      Some(serde_json::Value::Bool(fail)) => *fail,
      Some(_) => return Err(PluginError::invalid_params("'fail' must be a boolean")),
    };
    if fail {
      let error = params::optional_str(&request.params, "error")?.unwrap_or("echo failed");
      return Ok(ExecutorOutput::failure(data, error));
    }
    Ok(ExecutorOutput::success(data))
  }
}
