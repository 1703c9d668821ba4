//! Error types for the runner module.

use thiserror::Error;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur while running the external tool.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Terraform binary not found: {0}")]
    BinaryNotFound(String),

    #[error("Terraform command failed with exit code {exit_code}: {command}")]
    ExecutionFailed {
        command: String,
        exit_code: i32,
        output: String,
    },

    #[error("Terraform command timed out after {seconds} seconds: {command}")]
    Timeout { command: String, seconds: u64 },

    #[error("Failed to execute Terraform command: {0}")]
    Spawn(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Captured tool output, when the failure carries any.
    pub fn output(&self) -> Option<&str> {
        match self {
            RunnerError::ExecutionFailed { output, .. } => Some(output),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RunnerError::ExecutionFailed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}
