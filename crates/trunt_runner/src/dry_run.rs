//! Dry-run runner.
//!
//! Nothing is executed. Every invocation is logged, remembered, and reported
//! back as a successful no-op so whole workflows can be previewed.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

use crate::error::RunnerResult;
use crate::invocation::Invocation;
use crate::runner::{ExecutionResult, ToolRunner};

/// An invocation that would have been executed.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedInvocation {
    pub command: String,
    pub working_dir: PathBuf,
    pub env: BTreeMap<String, String>,
    pub recorded_at: DateTime<Utc>,
}

/// Records invocations instead of running them.
#[derive(Debug, Default)]
pub struct DryRunRunner {
    recorded: Mutex<Vec<RecordedInvocation>>,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, in call order.
    pub fn recorded(&self) -> Vec<RecordedInvocation> {
        self.recorded.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.recorded.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorded.lock().is_empty()
    }

    /// Human-readable listing of the recorded commands.
    pub fn summary(&self) -> String {
        let recorded = self.recorded.lock();
        let mut out = String::new();
        out.push_str(&"=".repeat(60));
        out.push_str("\nDRY RUN SUMMARY\n");
        out.push_str(&"=".repeat(60));
        out.push('\n');

        if recorded.is_empty() {
            out.push_str("No commands would be executed.\n");
            return out;
        }

        out.push_str(&format!("{} command(s) would be executed:\n", recorded.len()));
        for (i, entry) in recorded.iter().enumerate() {
            out.push_str(&format!("\n{}. {}\n", i + 1, entry.command));
            out.push_str(&format!("   Directory: {}\n", entry.working_dir.display()));
            for (key, value) in &entry.env {
                out.push_str(&format!("   {}={}\n", key, value));
            }
        }
        out
    }
}

#[async_trait]
impl ToolRunner for DryRunRunner {
    async fn run(&self, invocation: &Invocation) -> RunnerResult<ExecutionResult> {
        let command = invocation.display_command();
        info!("[DRY RUN] {} (in {})", command, invocation.working_dir.display());

        self.recorded.lock().push(RecordedInvocation {
            command: command.clone(),
            working_dir: invocation.working_dir.clone(),
            env: invocation.env.clone(),
            recorded_at: Utc::now(),
        });

        Ok(ExecutionResult::skipped(format!("[DRY RUN] {}", command)))
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}
