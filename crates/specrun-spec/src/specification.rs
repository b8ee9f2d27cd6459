use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::task::TaskSpec;

/// Root specification document.
///
/// Created once per run by the loader and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specification {
  pub schema_version: String,

  #[serde(default)]
  pub global_configuration: GlobalConfiguration,

  /// Tasks keyed by id, in declaration order.
  pub tasks: IndexMap<String, TaskSpec>,
}

/// Settings shared by every task in a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfiguration {
  /// Working directory for executors that touch the filesystem.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub workspace_root: Option<PathBuf>,

  /// Where evidence documents are written.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub evidence_directory: Option<PathBuf>,

  /// Default per-action timeout in milliseconds.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout: Option<u64>,

  /// Deadline for the whole run in milliseconds, checked at phase boundaries.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub run_timeout: Option<u64>,

  /// Fail conditions whose type has no registered validator instead of
  /// passing them with a warning.
  #[serde(default)]
  pub strict_validation: bool,
}
