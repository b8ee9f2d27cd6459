//! Specrun Spec
//!
//! This crate contains the serializable test specification types for specrun
//! and the loader that turns a document into a validated [`Specification`].
//!
//! Specifications can be written in:
//! - JSON (strict syntax, convenient for generated specs)
//! - YAML (friendlier for hand editing)
//!
//! Both parse to the same in-memory model. String values may reference
//! environment variables with `${NAME}` or `${NAME:-fallback}`.

mod action;
mod env;
mod error;
mod loader;
mod specification;
mod task;

pub use action::{ActionSpec, Params};
pub use env::substitute_env;
pub use error::SpecError;
pub use loader::{SpecFormat, SpecLoader, load_from_path, load_from_str};
pub use specification::{GlobalConfiguration, Specification};
pub use task::{Condition, TaskSpec, ValidationCriteria};
