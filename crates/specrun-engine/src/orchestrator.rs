//! Task orchestration.
//!
//! A task moves through
//! `Pending -> RunningPrereq -> RunningSteps -> RunningCleanup -> Passed | Failed | Skipped`.
//! Prerequisites gate the steps, cleanup runs once either of them has run,
//! and only a task whose steps finished without a blocking failure is
//! handed to the validation engine.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use specrun_evidence::EvidenceStore;
use specrun_plugin::{
  ActionResult, ExecutionContext, Phase, PluginRegistry, TaskResult, TaskStatus, ValidationResult,
};
use specrun_spec::{ActionSpec, TaskSpec};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::analysis::AnalysisStage;
use crate::dispatcher::ActionDispatcher;
use crate::events::{ExecutionEvent, ExecutionNotifier};
use crate::validation::ValidationEngine;

/// Lifecycle state of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
  Pending,
  RunningPrereq,
  RunningSteps,
  RunningCleanup,
  Passed,
  Failed,
  Skipped,
}

impl fmt::Display for TaskPhase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Pending => "PENDING",
      Self::RunningPrereq => "RUNNING_PREREQ",
      Self::RunningSteps => "RUNNING_STEPS",
      Self::RunningCleanup => "RUNNING_CLEANUP",
      Self::Passed => "PASSED",
      Self::Failed => "FAILED",
      Self::Skipped => "SKIPPED",
    };
    f.write_str(s)
  }
}

impl From<TaskStatus> for TaskPhase {
  fn from(status: TaskStatus) -> Self {
    match status {
      TaskStatus::Passed => Self::Passed,
      TaskStatus::Failed => Self::Failed,
      TaskStatus::Skipped => Self::Skipped,
    }
  }
}

/// Wall-clock budget for a whole run, checked at phase boundaries.
#[derive(Debug, Clone, Copy)]
pub struct RunDeadline {
  at: Instant,
  limit: Duration,
}

impl RunDeadline {
  /// A deadline `limit` from now.
  pub fn new(limit: Duration) -> Self {
    Self {
      at: Instant::now() + limit,
      limit,
    }
  }

  pub fn has_passed(&self) -> bool {
    Instant::now() >= self.at
  }

  fn describe(&self, when: &str) -> String {
    format!(
      "run timeout of {}ms elapsed {}",
      self.limit.as_millis(),
      when
    )
  }
}

/// Book-keeping for one task while it runs.
struct TaskRun<'t> {
  task_id: &'t str,
  state: TaskPhase,
  actions: Vec<ActionResult>,
  started_at: DateTime<Utc>,
  start: Instant,
}

impl<'t> TaskRun<'t> {
  fn new(task_id: &'t str) -> Self {
    Self {
      task_id,
      state: TaskPhase::Pending,
      actions: Vec::new(),
      started_at: Utc::now(),
      start: Instant::now(),
    }
  }

  fn transition(&mut self, next: TaskPhase) {
    debug!(task_id = %self.task_id, from = %self.state, to = %next, "task state transition");
    self.state = next;
  }
}

/// Drives one task at a time through its phases.
pub struct TaskOrchestrator<'a, N: ExecutionNotifier> {
  registry: &'a PluginRegistry,
  dispatcher: ActionDispatcher<'a>,
  validation: ValidationEngine,
  store: Option<&'a dyn EvidenceStore>,
  notifier: &'a N,
}

impl<'a, N: ExecutionNotifier> TaskOrchestrator<'a, N> {
  pub fn new(
    registry: &'a PluginRegistry,
    default_timeout: Duration,
    validation: ValidationEngine,
    store: Option<&'a dyn EvidenceStore>,
    notifier: &'a N,
  ) -> Self {
    Self {
      registry,
      dispatcher: ActionDispatcher::new(registry, default_timeout),
      validation,
      store,
      notifier,
    }
  }

  /// Run a task to completion and return its result.
  ///
  /// Never fails: every outcome, including run-timeout and evidence
  /// problems, is captured on the returned [`TaskResult`] or reported as an
  /// [`ExecutionEvent::Error`].
  #[instrument(
    name = "run_task",
    skip(self, task_id, task, ctx, deadline),
    fields(task_id = %task_id)
  )]
  pub async fn run_task(
    &self,
    task_id: &str,
    task: &TaskSpec,
    ctx: &mut ExecutionContext,
    deadline: Option<&RunDeadline>,
  ) -> TaskResult {
    let mut run = TaskRun::new(task_id);

    self.notifier.notify(ExecutionEvent::TaskStart {
      task_id: task_id.to_string(),
    });

    if let Some(store) = self.store
      && let Err(e) = store.begin_task(task_id).await
    {
      self.advise(format!("failed to reset evidence for task '{}': {}", task_id, e));
    }

    if task.skip {
      info!("task skipped");
      return self
        .finish(run, task, TaskStatus::Skipped, None, None)
        .await;
    }
    if let Some(deadline) = deadline.filter(|d| d.has_passed()) {
      let error = deadline.describe("before the task started");
      warn!(error = %error, "task skipped");
      return self
        .finish(run, task, TaskStatus::Skipped, None, Some(error))
        .await;
    }

    run.transition(TaskPhase::RunningPrereq);
    let mut blocked = self
      .run_phase(&mut run, Phase::Prerequisite, &task.prerequisites, ctx)
      .await
      .map(|action_id| format!("prerequisite '{}' failed", action_id));

    if blocked.is_none() {
      if let Some(deadline) = deadline.filter(|d| d.has_passed()) {
        blocked = Some(deadline.describe("before the steps started"));
      } else {
        run.transition(TaskPhase::RunningSteps);
        blocked = self
          .run_phase(&mut run, Phase::Step, &task.steps, ctx)
          .await
          .map(|action_id| format!("step '{}' failed", action_id));
      }
    }

    run.transition(TaskPhase::RunningCleanup);
    if let Some(action_id) = self
      .run_phase(&mut run, Phase::Cleanup, &task.cleanup, ctx)
      .await
    {
      // recorded, never changes the verdict
      debug!(action_id = %action_id, "cleanup halted");
    }

    let (status, validation) = match blocked {
      Some(_) => (TaskStatus::Failed, None),
      None => {
        let verdict = self
          .validation
          .evaluate(task.validation.as_ref(), task_id, ctx, self.registry)
          .await;
        let status = if verdict.passed {
          TaskStatus::Passed
        } else {
          TaskStatus::Failed
        };
        (status, Some(verdict))
      }
    };

    self
      .finish(run, task, status, validation, blocked)
      .await
  }

  /// Run one phase in order. Returns the id of the action that halted it.
  async fn run_phase(
    &self,
    run: &mut TaskRun<'_>,
    phase: Phase,
    actions: &[ActionSpec],
    ctx: &mut ExecutionContext,
  ) -> Option<String> {
    for action in actions {
      let result = self.dispatcher.dispatch(run.task_id, phase, action, ctx).await;
      let failed = !result.success;
      self.record(run, ctx, result).await;

      if failed && !action.continue_on_failure {
        debug!(task_id = %run.task_id, action_id = %action.id, %phase, "phase halted");
        return Some(action.id.clone());
      }
    }
    None
  }

  /// Context first, then evidence, then the event.
  async fn record(&self, run: &mut TaskRun<'_>, ctx: &mut ExecutionContext, result: ActionResult) {
    ctx.record(run.task_id, result.clone());

    if let Some(store) = self.store
      && let Err(e) = store
        .write_action(run.task_id, run.actions.len(), &result)
        .await
    {
      self.advise(format!(
        "failed to write evidence for action '{}' of task '{}': {}",
        result.action_id, run.task_id, e
      ));
    }

    self.notifier.notify(ExecutionEvent::ActionComplete {
      task_id: run.task_id.to_string(),
      action_id: result.action_id.clone(),
      phase: result.phase,
      success: result.success,
      duration_ms: result.duration_ms,
    });
    run.actions.push(result);
  }

  async fn finish(
    &self,
    mut run: TaskRun<'_>,
    task: &TaskSpec,
    status: TaskStatus,
    validation: Option<ValidationResult>,
    error: Option<String>,
  ) -> TaskResult {
    run.transition(status.into());

    let mut result = TaskResult {
      task_id: run.task_id.to_string(),
      title: task.title.clone(),
      status,
      started_at: run.started_at,
      finished_at: Utc::now(),
      duration_ms: u64::try_from(run.start.elapsed().as_millis()).unwrap_or(u64::MAX),
      actions: run.actions,
      validation,
      failure_analysis: Vec::new(),
      technical_debt: Vec::new(),
      error,
    };

    let stage = AnalysisStage::new(self.registry, self.notifier);
    match status {
      TaskStatus::Failed => result.failure_analysis = stage.analyze_failure(&result).await,
      TaskStatus::Passed => result.technical_debt = stage.detect_debt(&result).await,
      TaskStatus::Skipped => {}
    }

    if let Some(store) = self.store
      && let Err(e) = store.write_task(&result).await
    {
      self.advise(format!(
        "failed to write evidence for task '{}': {}",
        result.task_id, e
      ));
    }

    info!(
      task_id = %result.task_id,
      status = %result.status,
      duration_ms = result.duration_ms,
      actions = result.actions.len(),
      "task completed"
    );
    self.notifier.notify(ExecutionEvent::TaskComplete {
      task_id: result.task_id.clone(),
      status,
    });

    result
  }

  fn advise(&self, message: String) {
    warn!(error = %message, "evidence write failed");
    self.notifier.notify(ExecutionEvent::Error { message });
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_phase_names() {
    assert_eq!(TaskPhase::RunningPrereq.to_string(), "RUNNING_PREREQ");
    assert_eq!(TaskPhase::from(TaskStatus::Skipped), TaskPhase::Skipped);
  }

  #[tokio::test(start_paused = true)]
  async fn test_deadline_passes_with_time() {
    let deadline = RunDeadline::new(Duration::from_millis(100));
    assert!(!deadline.has_passed());
    tokio::time::advance(Duration::from_millis(100)).await;
    assert!(deadline.has_passed());
    assert_eq!(
      deadline.describe("before the steps started"),
      "run timeout of 100ms elapsed before the steps started"
    );
  }
}
