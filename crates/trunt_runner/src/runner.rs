//! Tool runner trait and types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RunnerResult;
use crate::invocation::Invocation;

/// Result of a completed tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Exit code of the tool
    pub exit_code: i32,
    /// Combined stdout and stderr, in the order lines arrived
    pub output: String,
    /// Execution start time
    pub started_at: DateTime<Utc>,
    /// Execution end time
    pub finished_at: DateTime<Utc>,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Result for an invocation that was not actually executed.
    pub fn skipped(output: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            exit_code: 0,
            output: output.into(),
            started_at: now,
            finished_at: now,
            duration_ms: 0,
        }
    }

    /// Check if execution was successful (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes the external infrastructure tool.
///
/// A returned `Ok` always means the tool succeeded; a nonzero exit status is
/// reported as [`RunnerError::ExecutionFailed`](crate::RunnerError::ExecutionFailed).
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run one invocation to completion.
    async fn run(&self, invocation: &Invocation) -> RunnerResult<ExecutionResult>;

    /// Whether this runner only records invocations.
    fn is_dry_run(&self) -> bool {
        false
    }
}
