//! Capability contracts implemented by plugins.
//!
//! There are five disjoint roles:
//!
//! | Capability        | Keyed by        | Resolution                          |
//! |-------------------|-----------------|-------------------------------------|
//! | `Executor`        | action type     | exactly one per key                 |
//! | `Validator`       | condition type  | exactly one per key                 |
//! | `FailureAnalyzer` | -               | all, descending priority            |
//! | `DebtDetector`    | -               | all, descending priority            |
//! | `Reporter`        | -               | all, registration order             |

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use specrun_spec::{Condition, Params};
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::error::PluginError;
use crate::result::{FailureAnalysisResult, Phase, RunResult, TaskResult, TechnicalDebtItem};

/// Everything an executor needs to run one action.
#[derive(Debug, Clone)]
pub struct ActionRequest {
  pub task_id: String,
  pub action_id: String,
  pub phase: Phase,
  /// Parameters after template resolution.
  pub params: Params,
  pub is_background: bool,
  /// Cancelled when the action times out.
  pub cancel: CancellationToken,
}

impl ActionRequest {
  pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
    self.params.get(key)
  }

  /// Required string parameter.
  pub fn str_param(&self, key: &str) -> Result<&str, PluginError> {
    self
      .params
      .get(key)
      .and_then(|v| v.as_str())
      .ok_or_else(|| PluginError::invalid_params(format!("'{}' must be a string", key)))
  }

  /// Optional unsigned integer parameter. Numeric strings are accepted.
  pub fn u64_param(&self, key: &str) -> Result<Option<u64>, PluginError> {
    match self.params.get(key) {
      None | Some(serde_json::Value::Null) => Ok(None),
      Some(serde_json::Value::Number(n)) => n
        .as_u64()
        .map(Some)
        .ok_or_else(|| PluginError::invalid_params(format!("'{}' must be a non-negative integer", key))),
      Some(serde_json::Value::String(s)) => s
        .trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|_| PluginError::invalid_params(format!("'{}' must be a non-negative integer", key))),
      Some(_) => Err(PluginError::invalid_params(format!(
        "'{}' must be a non-negative integer",
        key
      ))),
    }
  }
}

/// What an executor reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorOutput {
  pub success: bool,
  pub data: serde_json::Value,
  pub error: Option<String>,
}

impl ExecutorOutput {
  pub fn success(data: serde_json::Value) -> Self {
    Self {
      success: true,
      data,
      error: None,
    }
  }

  pub fn failure(data: serde_json::Value, error: impl Into<String>) -> Self {
    Self {
      success: false,
      data,
      error: Some(error.into()),
    }
  }
}

/// Runs actions of one action type.
#[async_trait]
pub trait Executor: Send + Sync {
  /// The action type this executor handles, e.g. "shell".
  fn action_type(&self) -> &str;

  /// Run one action.
  ///
  /// For background requests, return as soon as the work has started.
  async fn execute(
    &self,
    request: &ActionRequest,
    ctx: &ExecutionContext,
  ) -> Result<ExecutorOutput, PluginError>;

  /// Release anything still running, e.g. background processes.
  async fn shutdown(&self) {}
}

/// Evaluates conditions of one condition type.
#[async_trait]
pub trait Validator: Send + Sync {
  fn condition_type(&self) -> &str;

  /// Whether `condition` holds for `task_id`.
  async fn validate(
    &self,
    condition: &Condition,
    task_id: &str,
    ctx: &ExecutionContext,
  ) -> Result<bool, PluginError>;
}

/// Classifies failed tasks.
#[async_trait]
pub trait FailureAnalyzer: Send + Sync {
  fn name(&self) -> &str;

  /// Higher runs first.
  fn priority(&self) -> i32 {
    0
  }

  /// Return an empty list to decline.
  async fn analyze(&self, task: &TaskResult) -> Result<Vec<FailureAnalysisResult>, PluginError>;
}

/// Flags quality issues in passing tasks.
#[async_trait]
pub trait DebtDetector: Send + Sync {
  fn name(&self) -> &str;

  /// Higher runs first.
  fn priority(&self) -> i32 {
    0
  }

  /// Return an empty list to decline.
  async fn detect(&self, task: &TaskResult) -> Result<Vec<TechnicalDebtItem>, PluginError>;
}

/// Consumes the finished run.
#[async_trait]
pub trait Reporter: Send + Sync {
  fn name(&self) -> &str;

  async fn report(&self, run: &RunResult) -> Result<(), PluginError>;
}

/// The role a plugin plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
  Executor,
  Validator,
  FailureAnalyzer,
  DebtDetector,
  Reporter,
}

impl fmt::Display for Capability {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Executor => f.write_str("executor"),
      Self::Validator => f.write_str("validator"),
      Self::FailureAnalyzer => f.write_str("failure analyzer"),
      Self::DebtDetector => f.write_str("debt detector"),
      Self::Reporter => f.write_str("reporter"),
    }
  }
}

/// A plugin instance tagged with its capability.
#[derive(Clone)]
pub enum Plugin {
  Executor(Arc<dyn Executor>),
  Validator(Arc<dyn Validator>),
  FailureAnalyzer(Arc<dyn FailureAnalyzer>),
  DebtDetector(Arc<dyn DebtDetector>),
  Reporter(Arc<dyn Reporter>),
}

impl Plugin {
  pub fn executor(executor: impl Executor + 'static) -> Self {
    Self::Executor(Arc::new(executor))
  }

  pub fn validator(validator: impl Validator + 'static) -> Self {
    Self::Validator(Arc::new(validator))
  }

  pub fn failure_analyzer(analyzer: impl FailureAnalyzer + 'static) -> Self {
    Self::FailureAnalyzer(Arc::new(analyzer))
  }

  pub fn debt_detector(detector: impl DebtDetector + 'static) -> Self {
    Self::DebtDetector(Arc::new(detector))
  }

  pub fn reporter(reporter: impl Reporter + 'static) -> Self {
    Self::Reporter(Arc::new(reporter))
  }

  pub fn capability(&self) -> Capability {
    match self {
      Self::Executor(_) => Capability::Executor,
      Self::Validator(_) => Capability::Validator,
      Self::FailureAnalyzer(_) => Capability::FailureAnalyzer,
      Self::DebtDetector(_) => Capability::DebtDetector,
      Self::Reporter(_) => Capability::Reporter,
    }
  }

  /// Registry key or name of the plugin.
  pub fn name(&self) -> &str {
    match self {
      Self::Executor(p) => p.action_type(),
      Self::Validator(p) => p.condition_type(),
      Self::FailureAnalyzer(p) => p.name(),
      Self::DebtDetector(p) => p.name(),
      Self::Reporter(p) => p.name(),
    }
  }
}

impl fmt::Debug for Plugin {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Plugin")
      .field("capability", &self.capability())
      .field("name", &self.name())
      .finish()
  }
}

/// A source of plugins, e.g. a statically linked bundle or a directory scan.
pub trait PluginProvider: Send + Sync {
  fn name(&self) -> &str;

  /// Instantiate the provider's plugins.
  fn provide(&self) -> Result<Vec<Plugin>, PluginError>;
}
