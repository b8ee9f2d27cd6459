//! Error types for the engine.

use specrun_evidence::EvidenceError;
use specrun_spec::SpecError;
use thiserror::Error;

/// Errors that stop a run, or an engine operation, outright.
///
/// Anything that only affects one action or one task is captured in the
/// run result instead.
#[derive(Debug, Error)]
pub enum EngineError {
  /// `execute` or `get_evidence` was called before `initialize`.
  #[error("test runner is not initialized")]
  NotInitialized,

  /// The specification could not be loaded.
  #[error(transparent)]
  Spec(#[from] SpecError),

  /// No plugin provider could be loaded.
  #[error("plugin registry failed to initialize: {message}")]
  PluginRegistry { message: String },

  /// Evidence could not be read back.
  #[error(transparent)]
  Evidence(#[from] EvidenceError),
}
