//! Error types for the core module.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while discovering or ordering stacks.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Stack '{name}' not found. Available: {}", available.join(", "))]
    StackNotFound {
        name: String,
        available: Vec<String>,
    },

    #[error("Dependency error: {0}")]
    Dependency(String),

    #[error("Invalid configuration in {}: {message}", path.display())]
    InvalidConfiguration { path: PathBuf, message: String },

    #[error("Invalid setting {name}: {message}")]
    InvalidSetting { name: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Whether this error came from a dependency cycle.
    pub fn is_cycle(&self) -> bool {
        matches!(self, CoreError::Dependency(_))
    }
}
