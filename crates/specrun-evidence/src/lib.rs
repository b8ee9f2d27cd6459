//! Specrun Evidence
//!
//! This crate provides the storage trait and implementations for run
//! evidence: one document per executed action, one summary per task and
//! the run result itself.
//!
//! The [`EvidenceStore`] trait defines operations for:
//! - Starting a task, which discards its documents from an earlier run
//! - Writing action, task and run documents as they are produced
//! - Reading task summaries and the latest run back

mod fs_store;
mod types;

pub use fs_store::FsEvidenceStore;
pub use types::{ActionEvidence, timestamp_slug};

use std::path::PathBuf;

use async_trait::async_trait;
use specrun_plugin::{ActionResult, RunResult, TaskResult};

/// Error type for evidence operations.
#[derive(Debug, thiserror::Error)]
pub enum EvidenceError {
  /// Filesystem failure.
  #[error("evidence io error at '{}': {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// A document could not be encoded or decoded.
  #[error("evidence serialization error at '{}': {source}", path.display())]
  Serialization {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  /// An immutable document already exists.
  #[error("evidence document '{}' already exists", path.display())]
  AlreadyExists { path: PathBuf },

  /// The requested document was not found.
  #[error("evidence not found: {0}")]
  NotFound(String),
}

/// Storage for run evidence.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
  /// Called when a task starts, before any of its actions are written.
  /// Stores keyed by task id drop documents left by an earlier run here.
  async fn begin_task(&self, _task_id: &str) -> Result<(), EvidenceError> {
    Ok(())
  }

  /// Persist one executed action. `sequence` is its position within the task.
  async fn write_action(
    &self,
    task_id: &str,
    sequence: usize,
    result: &ActionResult,
  ) -> Result<(), EvidenceError>;

  /// Persist a finished task's summary.
  async fn write_task(&self, task: &TaskResult) -> Result<(), EvidenceError>;

  /// Persist a run: the "latest" document plus an immutable timestamped copy.
  async fn write_run(&self, run: &RunResult) -> Result<(), EvidenceError>;

  /// Read a task summary back.
  async fn read_task(&self, task_id: &str) -> Result<TaskResult, EvidenceError>;

  /// Read an action document back.
  async fn read_action(&self, task_id: &str, action_id: &str)
  -> Result<ActionEvidence, EvidenceError>;

  /// Read the most recent run.
  async fn read_latest_run(&self) -> Result<RunResult, EvidenceError>;
}
