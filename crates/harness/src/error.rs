//! Error types for the harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Node.js not found ({0}). Install Node.js and run: npm install playwright")]
    NodeNotFound(String),

    #[error("Bridge error: {0}")]
    Bridge(String),

    #[error("Bridge closed unexpectedly")]
    BridgeClosed,

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Common(#[from] botcheck_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;
