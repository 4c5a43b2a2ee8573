//! Error types for Brisk

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using BriskError
pub type Result<T> = std::result::Result<T, BriskError>;

/// Main error type for Brisk core operations
#[derive(Debug, Error)]
pub enum BriskError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Build declaration errors
    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading `make.toml` build declarations
#[derive(Debug, Error)]
pub enum DeclarationError {
    /// The declaration file could not be read
    #[error("Failed to read build declaration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The declaration file is not valid TOML for the expected schema
    #[error("Failed to parse build declaration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A task name that cannot be used as a path segment
    #[error("Invalid task name '{name}' in {path}: {reason}")]
    InvalidTaskName {
        path: PathBuf,
        name: String,
        reason: String,
    },

    /// Directory traversal failed
    #[error("Failed to scan {root} for build declarations: {message}")]
    Walk { root: PathBuf, message: String },
}

impl BriskError {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }
}
