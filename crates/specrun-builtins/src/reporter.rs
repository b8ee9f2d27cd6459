use async_trait::async_trait;
use specrun_plugin::{PluginError, Reporter, RunResult, TaskStatus};
use tracing::{info, warn};

/// Logs the run summary and one line per task.
pub struct SummaryReporter;

#[async_trait]
impl Reporter for SummaryReporter {
  fn name(&self) -> &str {
    "summary"
  }

  async fn report(&self, run: &RunResult) -> Result<(), PluginError> {
    for task in run.tasks.values() {
      match task.status {
        TaskStatus::Failed => warn!(
          task_id = %task.task_id,
          status = %task.status,
          duration_ms = task.duration_ms,
          analyses = task.failure_analysis.len(),
          error = task.error.as_deref().unwrap_or(""),
          "task result"
        ),
        _ => info!(
          task_id = %task.task_id,
          status = %task.status,
          duration_ms = task.duration_ms,
          debt_items = task.technical_debt.len(),
          "task result"
        ),
      }
    }

    info!(
      run_id = %run.run_id,
      total = run.summary.total,
      passed = run.summary.passed,
      failed = run.summary.failed,
      skipped = run.summary.skipped,
      duration_ms = run.duration_ms,
      "run summary"
    );
    Ok(())
  }
}
