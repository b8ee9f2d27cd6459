//! Mock plugins shared by the engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use specrun_engine::{ChannelNotifier, ExecutionEvent, RunnerConfig, SpecSource, TestRunner};
use specrun_plugin::{
  ActionRequest, DebtDetector, DebtEvidence, ExecutionContext, Executor, ExecutorOutput,
  FailureAnalysisResult, FailureAnalyzer, Phase, Plugin, PluginError, Severity, TaskResult,
  TechnicalDebtItem, Validator, categories,
};
use specrun_spec::{Condition, SpecFormat};
use tokio::sync::mpsc;

/// Executor for action type `mock`.
///
/// Params: `sleepMs` (wait first), `fail` (report failure), `error`
/// (failure message), `data` (output data, defaults to the params).
#[derive(Default, Clone)]
pub struct MockExecutor {
  pub calls: Arc<Mutex<Vec<String>>>,
  pub shutdowns: Arc<AtomicUsize>,
}

impl MockExecutor {
  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl Executor for MockExecutor {
  fn action_type(&self) -> &str {
    "mock"
  }

  async fn execute(
    &self,
    request: &ActionRequest,
    _ctx: &ExecutionContext,
  ) -> Result<ExecutorOutput, PluginError> {
    self
      .calls
      .lock()
      .unwrap()
      .push(format!("{}/{}", request.task_id, request.action_id));

    if let Some(ms) = request.u64_param("sleepMs")? {
      tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    let data = request
      .param("data")
      .cloned()
      .unwrap_or_else(|| serde_json::Value::Object(request.params.clone()));

    if request.param("fail").and_then(|v| v.as_bool()) == Some(true) {
      let error = request
        .param("error")
        .and_then(|v| v.as_str())
        .unwrap_or("mock failure");
      return Ok(ExecutorOutput::failure(data, error));
    }
    Ok(ExecutorOutput::success(data))
  }

  async fn shutdown(&self) {
    self.shutdowns.fetch_add(1, Ordering::SeqCst);
  }
}

/// Validator for condition type `flag`: holds when `params.value` is true.
pub struct FlagValidator;

#[async_trait]
impl Validator for FlagValidator {
  fn condition_type(&self) -> &str {
    "flag"
  }

  async fn validate(
    &self,
    condition: &Condition,
    _task_id: &str,
    _ctx: &ExecutionContext,
  ) -> Result<bool, PluginError> {
    Ok(condition.params.get("value").and_then(|v| v.as_bool()) == Some(true))
  }
}

/// Validator for condition type `succeeded`: `params.action` succeeded.
pub struct SucceededValidator;

#[async_trait]
impl Validator for SucceededValidator {
  fn condition_type(&self) -> &str {
    "succeeded"
  }

  async fn validate(
    &self,
    condition: &Condition,
    task_id: &str,
    ctx: &ExecutionContext,
  ) -> Result<bool, PluginError> {
    let action = condition
      .params
      .get("action")
      .and_then(|v| v.as_str())
      .ok_or_else(|| PluginError::invalid_params("'action' must be a string"))?;
    Ok(ctx.result(task_id, action).is_some_and(|r| r.success))
  }
}

/// Failure analyzer that counts its invocations and always contributes.
#[derive(Default, Clone)]
pub struct CountingAnalyzer {
  pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl FailureAnalyzer for CountingAnalyzer {
  fn name(&self) -> &str {
    "counting"
  }

  async fn analyze(&self, task: &TaskResult) -> Result<Vec<FailureAnalysisResult>, PluginError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let category = if task.actions.iter().all(|a| a.success) {
      categories::LOGIC_ERROR
    } else {
      categories::UNKNOWN_ERROR
    };
    Ok(vec![FailureAnalysisResult {
      analyzer: String::new(),
      category: category.to_string(),
      severity: Severity::Medium,
      confidence: 0.6,
      description: format!("task '{}' failed", task.task_id),
      recommendation: "inspect the evidence".to_string(),
      potential_causes: vec![],
    }])
  }
}

/// Flags every step slower than `threshold_ms`.
pub struct LatencyDetector {
  pub threshold_ms: u64,
  pub priority: i32,
}

#[async_trait]
impl DebtDetector for LatencyDetector {
  fn name(&self) -> &str {
    "latency"
  }

  fn priority(&self) -> i32 {
    self.priority
  }

  async fn detect(&self, task: &TaskResult) -> Result<Vec<TechnicalDebtItem>, PluginError> {
    Ok(
      task
        .actions_in(Phase::Step)
        .filter(|a| a.duration_ms > self.threshold_ms)
        .map(|a| TechnicalDebtItem {
          detector: self.name().to_string(),
          category: "PERFORMANCE".to_string(),
          severity: Severity::Medium,
          description: format!("'{}' took {}ms", a.action_id, a.duration_ms),
          recommendation: "profile the operation".to_string(),
          evidence: DebtEvidence {
            metric: "durationMs".to_string(),
            threshold: self.threshold_ms as f64,
            actual: a.duration_ms as f64,
            step_ids: vec![a.action_id.clone()],
          },
        })
        .collect(),
    )
  }
}

/// Flags every task with more than `max_steps` steps.
pub struct StepCountDetector {
  pub max_steps: usize,
  pub priority: i32,
}

#[async_trait]
impl DebtDetector for StepCountDetector {
  fn name(&self) -> &str {
    "stepCount"
  }

  fn priority(&self) -> i32 {
    self.priority
  }

  async fn detect(&self, task: &TaskResult) -> Result<Vec<TechnicalDebtItem>, PluginError> {
    let steps: Vec<String> = task
      .actions_in(Phase::Step)
      .map(|a| a.action_id.clone())
      .collect();
    if steps.len() <= self.max_steps {
      return Ok(vec![]);
    }
    Ok(vec![TechnicalDebtItem {
      detector: String::new(),
      category: "MAINTAINABILITY".to_string(),
      severity: Severity::Low,
      description: format!("{} steps", steps.len()),
      recommendation: "split the task".to_string(),
      evidence: DebtEvidence {
        metric: "stepCount".to_string(),
        threshold: self.max_steps as f64,
        actual: steps.len() as f64,
        step_ids: steps,
      },
    }])
  }
}

pub struct Harness {
  pub runner: TestRunner<ChannelNotifier>,
  pub events: mpsc::UnboundedReceiver<ExecutionEvent>,
  pub executor: MockExecutor,
  pub analyzer: CountingAnalyzer,
  pub dir: tempfile::TempDir,
}

impl Harness {
  /// Runner with the mock executor, both validators and the counting analyzer.
  pub fn new() -> Self {
    Self::with_config(RunnerConfig::default())
  }

  pub fn with_config(mut config: RunnerConfig) -> Self {
    let dir = tempfile::tempdir().unwrap();
    config.evidence_directory = Some(dir.path().to_path_buf());

    let (notifier, events) = ChannelNotifier::channel();
    let mut runner = TestRunner::with_notifier(config, notifier);
    let executor = MockExecutor::default();
    let analyzer = CountingAnalyzer::default();

    let registry = runner.registry_mut();
    registry.register(Plugin::executor(executor.clone())).unwrap();
    registry.register(Plugin::validator(FlagValidator)).unwrap();
    registry.register(Plugin::validator(SucceededValidator)).unwrap();
    registry
      .register(Plugin::failure_analyzer(analyzer.clone()))
      .unwrap();

    Self {
      runner,
      events,
      executor,
      analyzer,
      dir,
    }
  }

  pub async fn load(&mut self, spec: serde_json::Value) {
    self
      .runner
      .initialize(SpecSource::raw(spec.to_string(), SpecFormat::Json))
      .await
      .unwrap();
  }

  pub fn drain_events(&mut self) -> Vec<ExecutionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = self.events.try_recv() {
      events.push(event);
    }
    events
  }
}

pub fn mock(id: &str) -> serde_json::Value {
  json!({ "id": id, "type": "mock" })
}

pub fn failing(id: &str) -> serde_json::Value {
  json!({ "id": id, "type": "mock", "params": { "fail": true, "error": format!("{} broke", id) } })
}
