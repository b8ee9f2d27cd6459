//! Specification loading: parse, validate, substitute environment references.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::env::substitute_value;
use crate::error::SpecError;
use crate::specification::Specification;

/// Serialization of a specification document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFormat {
  Json,
  Yaml,
}

impl SpecFormat {
  /// Infer the format from a file extension.
  pub fn from_path(path: &Path) -> Option<Self> {
    match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
      "json" => Some(Self::Json),
      "yaml" | "yml" => Some(Self::Yaml),
      _ => None,
    }
  }
}

impl fmt::Display for SpecFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Json => f.write_str("json"),
      Self::Yaml => f.write_str("yaml"),
    }
  }
}

impl FromStr for SpecFormat {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "json" => Ok(Self::Json),
      "yaml" | "yml" => Ok(Self::Yaml),
      other => Err(format!("unknown specification format '{}'", other)),
    }
  }
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Loads specifications with a configurable environment lookup.
pub struct SpecLoader {
  env: EnvLookup,
}

impl Default for SpecLoader {
  fn default() -> Self {
    Self::with_env(|name| std::env::var(name).ok())
  }
}

impl SpecLoader {
  /// Create a loader that resolves `${NAME}` references through `lookup`.
  pub fn with_env(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
    Self {
      env: Box::new(lookup),
    }
  }

  /// Read and load a specification file.
  ///
  /// The format is taken from `format`, or inferred from the extension.
  pub async fn load_path(
    &self,
    path: &Path,
    format: Option<SpecFormat>,
  ) -> Result<Specification, SpecError> {
    let format = match format.or_else(|| SpecFormat::from_path(path)) {
      Some(f) => f,
      None => {
        return Err(SpecError::UnknownFormat {
          path: path.to_path_buf(),
        });
      }
    };

    let raw = tokio::fs::read_to_string(path)
      .await
      .map_err(|source| SpecError::Io {
        path: path.to_path_buf(),
        source,
      })?;

    debug!(path = %path.display(), %format, "loading specification");
    self.load_str(&raw, format)
  }

  /// Load a specification from a raw document.
  pub fn load_str(&self, raw: &str, format: SpecFormat) -> Result<Specification, SpecError> {
    let mut document = parse_document(raw, format)?;

    check_required_shape(&document)?;

    let mut missing = Vec::new();
    substitute_value(&mut document, &self.env, &mut missing);
    missing.sort();
    missing.dedup();
    for name in &missing {
      warn!(variable = %name, "environment variable referenced by specification is not set");
    }

    let spec: Specification =
      serde_json::from_value(document).map_err(|e| SpecError::Validation {
        problems: vec![e.to_string()],
      })?;

    validate(&spec)?;

    debug!(
      schema_version = %spec.schema_version,
      tasks = spec.tasks.len(),
      "specification loaded"
    );
    Ok(spec)
  }
}

/// Load a specification file using the process environment.
pub async fn load_from_path(
  path: &Path,
  format: Option<SpecFormat>,
) -> Result<Specification, SpecError> {
  SpecLoader::default().load_path(path, format).await
}

/// Load a raw specification document using the process environment.
pub fn load_from_str(raw: &str, format: SpecFormat) -> Result<Specification, SpecError> {
  SpecLoader::default().load_str(raw, format)
}

fn parse_document(raw: &str, format: SpecFormat) -> Result<serde_json::Value, SpecError> {
  let parsed = match format {
    SpecFormat::Json => serde_json::from_str(raw).map_err(|e| e.to_string()),
    SpecFormat::Yaml => serde_yaml::from_str(raw).map_err(|e| e.to_string()),
  };

  parsed.map_err(|message| SpecError::Parse {
    format: format.to_string(),
    message,
  })
}

/// Presence checks done on the raw document, before typed deserialization,
/// so missing fields are reported as validation problems rather than parse noise.
fn check_required_shape(document: &serde_json::Value) -> Result<(), SpecError> {
  let Some(root) = document.as_object() else {
    return Err(SpecError::Validation {
      problems: vec!["specification root must be a mapping".to_string()],
    });
  };

  let mut problems = Vec::new();

  match root.get("schemaVersion") {
    None | Some(serde_json::Value::Null) => problems.push("missing 'schemaVersion'".to_string()),
    Some(serde_json::Value::String(s)) if s.trim().is_empty() => {
      problems.push("'schemaVersion' must not be empty".to_string())
    }
    _ => {}
  }

  match root.get("tasks") {
    None | Some(serde_json::Value::Null) => problems.push("missing 'tasks'".to_string()),
    Some(serde_json::Value::Object(tasks)) if tasks.is_empty() => {
      problems.push("'tasks' must not be empty".to_string())
    }
    Some(serde_json::Value::Object(_)) => {}
    Some(_) => problems.push("'tasks' must be a mapping of task id to task".to_string()),
  }

  if problems.is_empty() {
    Ok(())
  } else {
    Err(SpecError::Validation { problems })
  }
}

/// Semantic checks on the typed specification.
fn validate(spec: &Specification) -> Result<(), SpecError> {
  let mut problems = Vec::new();

  for (task_id, task) in &spec.tasks {
    if task_id.trim().is_empty() {
      problems.push("task id must not be empty".to_string());
    }
    if task.title.trim().is_empty() {
      problems.push(format!("task '{}': title must not be empty", task_id));
    }

    let mut seen = HashSet::new();
    for action in task.all_actions() {
      if action.id.trim().is_empty() {
        problems.push(format!("task '{}': action id must not be empty", task_id));
      } else if !seen.insert(action.id.as_str()) {
        problems.push(format!(
          "task '{}': duplicate action id '{}'",
          task_id, action.id
        ));
      }
      if action.action_type.trim().is_empty() {
        problems.push(format!(
          "task '{}': action '{}' has no type",
          task_id, action.id
        ));
      }
    }

    if let Some(criteria) = &task.validation {
      for condition in criteria.success.iter().chain(criteria.failure.iter()) {
        if condition.condition_type.trim().is_empty() {
          problems.push(format!("task '{}': condition has no type", task_id));
        }
      }
    }
  }

  if problems.is_empty() {
    Ok(())
  } else {
    Err(SpecError::Validation { problems })
  }
}
