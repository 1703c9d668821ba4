//! Mock tool runner for testing.
//!
//! Captures every invocation and answers with a canned success unless a
//! failure was registered for the stack directory and subcommand. An optional
//! delay plus an in-flight counter let tests observe scheduling behavior.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::error::{RunnerError, RunnerResult};
use crate::invocation::Invocation;
use crate::runner::{ExecutionResult, ToolRunner};

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Final path component of the working directory
    pub dir_name: String,
}

impl CapturedCall {
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(|s| s.as_str())
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

/// Scheduling event recorded by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Started(String),
    Finished(String),
}

/// Mock tool runner for testing.
#[derive(Clone)]
pub struct MockRunner {
    /// (directory name, subcommand) pairs that fail.
    failures: Arc<RwLock<BTreeSet<(String, String)>>>,
    /// Exit code reported for simulated failures.
    failure_exit_code: Arc<RwLock<i32>>,
    /// Output returned for every successful call.
    output: Arc<RwLock<String>>,
    /// Simulated run time per call.
    delay: Arc<RwLock<Option<Duration>>>,
    /// Captured calls for verification.
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    /// Start/finish events in the order they happened.
    events: Arc<RwLock<Vec<MockEvent>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    pub fn new() -> Self {
        Self {
            failures: Arc::new(RwLock::new(BTreeSet::new())),
            failure_exit_code: Arc::new(RwLock::new(1)),
            output: Arc::new(RwLock::new(String::new())),
            delay: Arc::new(RwLock::new(None)),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
            events: Arc::new(RwLock::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail calls of `subcommand` run inside a directory named `dir_name`.
    pub fn fail_when(self, dir_name: impl Into<String>, subcommand: impl Into<String>) -> Self {
        self.failures
            .write()
            .insert((dir_name.into(), subcommand.into()));
        self
    }

    pub fn failure_exit_code(self, code: i32) -> Self {
        *self.failure_exit_code.write() = code;
        self
    }

    pub fn with_output(self, output: impl Into<String>) -> Self {
        *self.output.write() = output.into();
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.write() = Some(delay);
        self
    }

    /// Clear all captured calls and events.
    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
        self.events.write().clear();
    }

    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Calls whose first argument is `subcommand`.
    pub fn get_subcommand_calls(&self, subcommand: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.subcommand() == Some(subcommand))
            .cloned()
            .collect()
    }

    /// Directory names that ran `subcommand`, in call order.
    pub fn dirs_for(&self, subcommand: &str) -> Vec<String> {
        self.get_subcommand_calls(subcommand)
            .into_iter()
            .map(|c| c.dir_name)
            .collect()
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.events.read().clone()
    }

    /// Highest number of calls that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record_call(&self, invocation: &Invocation) -> CapturedCall {
        let dir_name = invocation
            .working_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let call = CapturedCall {
            program: invocation.program.clone(),
            args: invocation.args.clone(),
            working_dir: invocation.working_dir.clone(),
            dir_name,
        };
        self.captured_calls.write().push(call.clone());
        call
    }

    fn should_fail(&self, call: &CapturedCall) -> bool {
        let subcommand = call.subcommand().unwrap_or_default().to_string();
        self.failures
            .read()
            .contains(&(call.dir_name.clone(), subcommand))
    }
}

#[async_trait]
impl ToolRunner for MockRunner {
    async fn run(&self, invocation: &Invocation) -> RunnerResult<ExecutionResult> {
        let call = self.record_call(invocation);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.events
            .write()
            .push(MockEvent::Started(call.dir_name.clone()));

        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.events
            .write()
            .push(MockEvent::Finished(call.dir_name.clone()));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.should_fail(&call) {
            return Err(RunnerError::ExecutionFailed {
                command: invocation.display_command(),
                exit_code: *self.failure_exit_code.read(),
                output: format!("simulated failure in {}", call.dir_name),
            });
        }

        let started_at = Utc::now();
        Ok(ExecutionResult {
            exit_code: 0,
            output: self.output.read().clone(),
            started_at,
            finished_at: started_at,
            duration_ms: delay.map(|d| d.as_millis() as u64).unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_runner_captures_calls() {
        let runner = MockRunner::new().with_output("No changes.");

        let invocation = Invocation::new("terraform")
            .args(["plan", "-input=false"])
            .working_dir("/infra/vpc");
        let result = runner.run(&invocation).await.unwrap();

        assert_eq!(result.output, "No changes.");
        let calls = runner.get_subcommand_calls("plan");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].dir_name, "vpc");
        assert!(calls[0].has_arg("-input=false"));
    }

    #[tokio::test]
    async fn test_mock_runner_targeted_failure() {
        let runner = MockRunner::new()
            .fail_when("app", "apply")
            .failure_exit_code(2);

        let apply_app = Invocation::new("terraform").arg("apply").working_dir("/infra/app");
        let plan_app = Invocation::new("terraform").arg("plan").working_dir("/infra/app");
        let apply_vpc = Invocation::new("terraform").arg("apply").working_dir("/infra/vpc");

        let err = runner.run(&apply_app).await.unwrap_err();
        assert_eq!(err.exit_code(), Some(2));
        assert!(runner.run(&plan_app).await.is_ok());
        assert!(runner.run(&apply_vpc).await.is_ok());
        assert_eq!(runner.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_runner_tracks_concurrency() {
        let runner = MockRunner::new().with_delay(Duration::from_millis(50));

        let a = Invocation::new("terraform").arg("plan").working_dir("/infra/a");
        let b = Invocation::new("terraform").arg("plan").working_dir("/infra/b");
        let (ra, rb) = tokio::join!(runner.run(&a), runner.run(&b));

        assert!(ra.is_ok() && rb.is_ok());
        assert_eq!(runner.max_in_flight(), 2);
        assert_eq!(runner.events().len(), 4);
    }
}
