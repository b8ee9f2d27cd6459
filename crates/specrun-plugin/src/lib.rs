//! Specrun plugin model.
//!
//! Everything the engine and its plugins share:
//! - the five capability traits ([`Executor`], [`Validator`],
//!   [`FailureAnalyzer`], [`DebtDetector`], [`Reporter`]),
//! - the [`PluginRegistry`] that resolves them,
//! - the [`ExecutionContext`] plugins read from,
//! - the result types persisted as evidence.

mod capability;
mod context;
mod error;
mod registry;
mod result;

pub use capability::{
  ActionRequest, Capability, DebtDetector, Executor, ExecutorOutput, FailureAnalyzer, Plugin,
  PluginProvider, Reporter, Validator,
};
pub use context::ExecutionContext;
pub use error::{PluginError, RegistryError};
pub use registry::{LoadReport, PluginRegistry};
pub use result::{
  ActionError, ActionErrorKind, ActionResult, ConditionOutcome, DebtEvidence,
  FailureAnalysisResult, Phase, RunResult, RunSummary, Severity, TaskResult, TaskStatus,
  TechnicalDebtItem, ValidationResult, categories,
};
