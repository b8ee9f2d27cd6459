//! Plugin and registry errors.

use crate::capability::Capability;

/// Errors raised by plugin implementations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PluginError {
  /// Parameters did not have the shape the plugin expects.
  #[error("invalid parameters: {message}")]
  InvalidParams { message: String },

  /// The plugin ran but could not complete its work.
  #[error("{message}")]
  Failed { message: String },

  /// The plugin could not be created.
  #[error("plugin initialization failed: {message}")]
  Initialization { message: String },
}

impl PluginError {
  pub fn invalid_params(message: impl Into<String>) -> Self {
    Self::InvalidParams {
      message: message.into(),
    }
  }

  pub fn failed(message: impl Into<String>) -> Self {
    Self::Failed {
      message: message.into(),
    }
  }

  pub fn initialization(message: impl Into<String>) -> Self {
    Self::Initialization {
      message: message.into(),
    }
  }
}

/// Errors raised while registering plugins.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
  /// An executor for this action type is already registered.
  #[error("an executor for action type '{action_type}' is already registered")]
  DuplicateExecutor { action_type: String },

  /// A validator for this condition type is already registered.
  #[error("a validator for condition type '{condition_type}' is already registered")]
  DuplicateValidator { condition_type: String },

  /// The plugin's key is empty.
  #[error("{capability} plugin has an empty name")]
  EmptyKey { capability: Capability },
}
