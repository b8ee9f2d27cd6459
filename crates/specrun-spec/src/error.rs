//! Specification loading errors.

use std::path::PathBuf;

/// Errors that can occur while loading a specification.
///
/// All of them are fatal to a run: no partial specification is usable.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
  /// The document could not be read.
  #[error("failed to read specification '{}': {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The format could not be inferred from the file name.
  #[error("cannot infer specification format from '{}' (expected .json, .yaml or .yml)", path.display())]
  UnknownFormat { path: PathBuf },

  /// Malformed syntax.
  #[error("failed to parse {format} specification: {message}")]
  Parse { format: String, message: String },

  /// Required fields missing or inconsistent.
  #[error("invalid specification: {}", problems.join("; "))]
  Validation { problems: Vec<String> },
}
