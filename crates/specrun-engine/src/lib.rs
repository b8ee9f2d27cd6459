//! Specrun Engine
//!
//! This crate runs loaded specifications: it dispatches actions to executor
//! plugins, drives each task through its phases, validates the outcome and
//! runs the failure-analysis or technical-debt stage on the verdict.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TestRunner                           │
//! │  - load_plugins / initialize / execute / cleanup            │
//! │  - owns the registry, the notifier and the evidence store   │
//! └─────────────────────────────────────────────────────────────┘
//!                               │ one task at a time
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TaskOrchestrator                        │
//! │  - PREREQ → STEPS → CLEANUP, halt / continue policy         │
//! │  - ValidationEngine, then AnalysisStage on the verdict      │
//! │  - action and task evidence, lifecycle events               │
//! └─────────────────────────────────────────────────────────────┘
//!                               │ one action at a time
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ActionDispatcher                        │
//! │  - parameter templates via minijinja                        │
//! │  - executor lookup, timeout, panic containment              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use specrun_engine::{ChannelNotifier, RunnerConfig, SpecSource, TestRunner};
//!
//! let (notifier, mut events) = ChannelNotifier::channel();
//! let mut runner = TestRunner::with_notifier(RunnerConfig::default(), notifier);
//! runner.registry_mut().register(Plugin::executor(MyExecutor))?;
//! runner.initialize(SpecSource::path("spec.yaml")).await?;
//!
//! let run = runner.execute().await?;
//! println!("{} of {} tasks failed", run.summary.failed, run.summary.total);
//! runner.cleanup().await;
//! ```

mod analysis;
mod dispatcher;
mod error;
mod events;
mod orchestrator;
mod runner;
mod template;
mod validation;

pub use analysis::AnalysisStage;
pub use dispatcher::{ActionDispatcher, DEFAULT_ACTION_TIMEOUT_MS};
pub use error::EngineError;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use orchestrator::{RunDeadline, TaskOrchestrator, TaskPhase};
pub use runner::{RunnerConfig, SpecSource, TestRunner};
pub use template::resolve_params;
pub use validation::ValidationEngine;
