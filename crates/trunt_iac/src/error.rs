//! Error types for stack operations and state backend access.

use thiserror::Error;

use crate::bootstrap::BootstrapStage;

/// Result type alias for stack operations.
pub type IacResult<T> = Result<T, IacError>;

/// Result type alias for backend info lookups.
pub type BackendResult<T> = Result<T, BackendError>;

/// Failures talking to the remote state backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("AWS credentials not available: {0}")]
    Credentials(String),

    #[error("AWS API error during {operation}: {message}")]
    Api { operation: String, message: String },
}

/// Errors that can occur during stack operations.
#[derive(Error, Debug)]
pub enum IacError {
    #[error(transparent)]
    Core(#[from] trunt_core::CoreError),

    #[error(transparent)]
    Runner(#[from] trunt_runner::RunnerError),

    #[error("Backend info error: {0}")]
    Backend(#[from] BackendError),

    #[error("Bootstrap failed at stage {stage}: {message}")]
    Bootstrap {
        stage: BootstrapStage,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
