//! Error types for botcheck

use thiserror::Error;

/// Result type alias using the botcheck common Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building or loading templates and rules
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid variable name: {0:?}")]
    InvalidVariableName(String),

    #[error("Invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid rule {index}: {reason}")]
    InvalidRule { index: usize, reason: String },

    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("Duplicate scenario: {0}")]
    DuplicateScenario(String),
}
