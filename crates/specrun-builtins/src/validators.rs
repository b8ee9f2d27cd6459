//! Validators over recorded action results.
//!
//! Every validator reads the task's results from the execution context. An
//! action that never ran makes its condition false rather than an error.

use async_trait::async_trait;
use regex::Regex;
use specrun_plugin::{ActionResult, ExecutionContext, PluginError, Validator};
use specrun_spec::Condition;

use crate::params;

fn target<'c>(
  condition: &Condition,
  task_id: &str,
  ctx: &'c ExecutionContext,
) -> Result<Option<&'c ActionResult>, PluginError> {
  let action = params::required_str(&condition.params, "action")?;
  Ok(ctx.result(task_id, action))
}

/// `params.action` succeeded. Without `action`, every action of the task did.
pub struct ActionSucceededValidator;

#[async_trait]
impl Validator for ActionSucceededValidator {
  fn condition_type(&self) -> &str {
    "actionSucceeded"
  }

  async fn validate(
    &self,
    condition: &Condition,
    task_id: &str,
    ctx: &ExecutionContext,
  ) -> Result<bool, PluginError> {
    match params::optional_str(&condition.params, "action")? {
      Some(action) => Ok(ctx.result(task_id, action).is_some_and(|r| r.success)),
      None => Ok(ctx.results(task_id).iter().all(|r| r.success)),
    }
  }
}

/// The value at JSON pointer `params.path` in `params.action`'s data equals
/// `params.expected`.
pub struct OutputEqualsValidator;

#[async_trait]
impl Validator for OutputEqualsValidator {
  fn condition_type(&self) -> &str {
    "outputEquals"
  }

  async fn validate(
    &self,
    condition: &Condition,
    task_id: &str,
    ctx: &ExecutionContext,
  ) -> Result<bool, PluginError> {
    let expected = params::required(&condition.params, "expected")?;
    let path = params::optional_str(&condition.params, "path")?.unwrap_or("");
    let Some(result) = target(condition, task_id, ctx)? else {
      return Ok(false);
    };
    Ok(params::pointer(&result.data, path)? == Some(expected))
  }
}

/// Regex `params.pattern` matches the value at `params.path`.
///
/// Non-string values are matched against their JSON text.
pub struct OutputMatchesValidator;

#[async_trait]
impl Validator for OutputMatchesValidator {
  fn condition_type(&self) -> &str {
    "outputMatches"
  }

  async fn validate(
    &self,
    condition: &Condition,
    task_id: &str,
    ctx: &ExecutionContext,
  ) -> Result<bool, PluginError> {
    let pattern = params::required_str(&condition.params, "pattern")?;
    let pattern = Regex::new(pattern)
      .map_err(|e| PluginError::invalid_params(format!("invalid 'pattern': {}", e)))?;
    let path = params::optional_str(&condition.params, "path")?.unwrap_or("");
    let Some(result) = target(condition, task_id, ctx)? else {
      return Ok(false);
    };

    Ok(match params::pointer(&result.data, path)? {
      None | Some(serde_json::Value::Null) => false,
      Some(serde_json::Value::String(s)) => pattern.is_match(s),
      Some(other) => pattern.is_match(&other.to_string()),
    })
  }
}

/// `params.action` finished in under `params.maxMs` milliseconds.
pub struct DurationBelowValidator;

#[async_trait]
impl Validator for DurationBelowValidator {
  fn condition_type(&self) -> &str {
    "durationBelow"
  }

  async fn validate(
    &self,
    condition: &Condition,
    task_id: &str,
    ctx: &ExecutionContext,
  ) -> Result<bool, PluginError> {
    let max_ms = params::required(&condition.params, "maxMs")?
      .as_u64()
      .ok_or_else(|| PluginError::invalid_params("'maxMs' must be a non-negative integer"))?;
    let Some(result) = target(condition, task_id, ctx)? else {
      return Ok(false);
    };
    Ok(result.duration_ms < max_ms)
  }
}
