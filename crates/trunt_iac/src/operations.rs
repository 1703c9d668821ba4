//! Stack operations.
//!
//! Single-stack `init`/`plan`/`apply`/`destroy`, and the bulk variants that
//! walk the resolved dependency order wave by wave. Stacks inside a wave run
//! concurrently (bounded by `max_parallel`); a wave only starts once every
//! task of the previous one has finished.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use trunt_core::{DependencyResolver, ExecutionPlan, Stack, StackRepository};

use crate::backend::BackendInfoProvider;
use crate::error::IacResult;
use crate::terraform::TerraformCommands;

/// Outcome of a single-stack operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackOutcome {
    Completed,
    /// The stack is excluded from destroy operations
    Skipped,
}

/// Bulk operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkOperation {
    Init,
    Plan,
    Apply,
    Destroy,
}

impl BulkOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkOperation::Init => "init",
            BulkOperation::Plan => "plan",
            BulkOperation::Apply => "apply",
            BulkOperation::Destroy => "destroy",
        }
    }

    /// Whether a failure stops every later wave.
    pub fn is_fail_fast(&self) -> bool {
        matches!(self, BulkOperation::Apply | BulkOperation::Destroy)
    }
}

impl fmt::Display for BulkOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stack that failed inside a bulk operation.
#[derive(Debug, Clone, Serialize)]
pub struct StackFailure {
    pub stack: String,
    pub error: String,
}

/// Aggregate result of a bulk operation.
#[derive(Debug, Clone, Serialize)]
pub struct BulkReport {
    pub operation: BulkOperation,
    pub succeeded: Vec<String>,
    pub failed: Vec<StackFailure>,
    /// Excluded up front (skip-on-destroy)
    pub skipped: Vec<String>,
    /// Never started because an earlier wave failed
    pub not_attempted: Vec<String>,
}

impl BulkReport {
    pub fn new(operation: BulkOperation) -> Self {
        Self {
            operation,
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            not_attempted: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.not_attempted.is_empty()
    }

    /// Stacks the operation was meant to run on.
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.not_attempted.len()
    }

    /// `succeeded/total`, e.g. `3/4`.
    pub fn ratio(&self) -> String {
        format!("{}/{}", self.succeeded.len(), self.total())
    }

    pub fn summary_line(&self) -> String {
        format!("{} completed: {} successful", self.operation, self.ratio())
    }
}

/// Per-stack and bulk terraform operations for one environment.
#[derive(Clone)]
pub struct StackOperations {
    repository: Arc<StackRepository>,
    terraform: TerraformCommands,
    backend: Arc<dyn BackendInfoProvider>,
    env: String,
    max_parallel: usize,
}

impl StackOperations {
    pub fn new(
        repository: Arc<StackRepository>,
        terraform: TerraformCommands,
        backend: Arc<dyn BackendInfoProvider>,
        env: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            terraform,
            backend,
            env: env.into(),
            max_parallel: 4,
        }
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    pub fn repository(&self) -> &Arc<StackRepository> {
        &self.repository
    }

    /// Resolve the current stack set into an execution plan.
    pub fn execution_plan(&self) -> IacResult<ExecutionPlan> {
        let stacks = self.repository.discover()?;
        Ok(DependencyResolver::new(&stacks).resolve()?)
    }

    pub async fn init_stack(&self, name: &str) -> IacResult<StackOutcome> {
        let stack = self.repository.get(name)?;
        self.init(&stack).await
    }

    pub async fn plan_stack(&self, name: &str, extra_args: &[String]) -> IacResult<StackOutcome> {
        let stack = self.repository.get(name)?;
        self.terraform.plan(&self.env, &stack, extra_args).await?;
        Ok(StackOutcome::Completed)
    }

    pub async fn apply_stack(&self, name: &str, extra_args: &[String]) -> IacResult<StackOutcome> {
        let stack = self.repository.get(name)?;
        self.terraform.apply(&self.env, &stack, extra_args).await?;
        Ok(StackOutcome::Completed)
    }

    /// Destroy one stack; stacks flagged `skip_on_destroy` are left untouched.
    pub async fn destroy_stack(&self, name: &str, extra_args: &[String]) -> IacResult<StackOutcome> {
        let stack = self.repository.get(name)?;
        self.destroy(&stack, extra_args).await
    }

    pub async fn init_all(&self) -> IacResult<BulkReport> {
        let plan = self.execution_plan()?;
        Ok(self.run_waves(BulkOperation::Init, plan.waves(), Vec::new(), Vec::new()).await)
    }

    pub async fn plan_all(&self, extra_args: &[String]) -> IacResult<BulkReport> {
        let plan = self.execution_plan()?;
        Ok(self
            .run_waves(BulkOperation::Plan, plan.waves(), Vec::new(), extra_args.to_vec())
            .await)
    }

    pub async fn apply_all(&self, extra_args: &[String]) -> IacResult<BulkReport> {
        let plan = self.execution_plan()?;
        Ok(self
            .run_waves(BulkOperation::Apply, plan.waves(), Vec::new(), extra_args.to_vec())
            .await)
    }

    /// Destroy every stack, dependents first, leaving the skip set alone.
    pub async fn destroy_all(&self, extra_args: &[String]) -> IacResult<BulkReport> {
        let plan = self.execution_plan()?;
        let skipped: Vec<String> = plan
            .ordered
            .iter()
            .rev()
            .filter(|s| plan.is_skipped_on_destroy(&s.name))
            .map(|s| s.name.clone())
            .collect();
        for name in &skipped {
            info!("Skipping destroy for stack: {} (skip_on_destroy)", name);
        }

        Ok(self
            .run_waves(BulkOperation::Destroy, plan.destroy_waves(), skipped, extra_args.to_vec())
            .await)
    }

    async fn init(&self, stack: &Stack) -> IacResult<StackOutcome> {
        let backend_args = self.backend.backend_cli_args(&self.env, &stack.name).await?;
        self.terraform.init(&self.env, stack, &backend_args).await?;
        Ok(StackOutcome::Completed)
    }

    async fn destroy(&self, stack: &Stack, extra_args: &[String]) -> IacResult<StackOutcome> {
        if stack.skip_on_destroy {
            info!("Skipping destroy for stack: {} (skip_on_destroy)", stack.name);
            return Ok(StackOutcome::Skipped);
        }
        self.terraform.destroy(&self.env, stack, extra_args).await?;
        Ok(StackOutcome::Completed)
    }

    async fn run_one(
        &self,
        operation: BulkOperation,
        stack: &Stack,
        extra_args: &[String],
    ) -> IacResult<StackOutcome> {
        match operation {
            BulkOperation::Init => self.init(stack).await,
            BulkOperation::Plan => {
                self.terraform.plan(&self.env, stack, extra_args).await?;
                Ok(StackOutcome::Completed)
            }
            BulkOperation::Apply => {
                self.terraform.apply(&self.env, stack, extra_args).await?;
                Ok(StackOutcome::Completed)
            }
            BulkOperation::Destroy => self.destroy(stack, extra_args).await,
        }
    }

    async fn run_waves(
        &self,
        operation: BulkOperation,
        waves: Vec<Vec<Stack>>,
        skipped: Vec<String>,
        extra_args: Vec<String>,
    ) -> BulkReport {
        let mut report = BulkReport::new(operation);
        report.skipped = skipped;

        let total: usize = waves.iter().map(Vec::len).sum();
        info!(
            "Running {} on {} stacks in {} waves",
            operation,
            total,
            waves.len()
        );

        let extra_args: Arc<[String]> = extra_args.into();
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut waves = waves.into_iter().enumerate();
        let wave_count = waves.len();

        for (index, wave) in waves.by_ref() {
            let names: Vec<&str> = wave.iter().map(|s| s.name.as_str()).collect();
            info!("Wave {}/{}: {}", index + 1, wave_count, names.join(", "));

            let outcomes = self
                .run_wave(operation, &wave, Arc::clone(&semaphore), Arc::clone(&extra_args))
                .await;

            for (stack, outcome) in wave.iter().zip(outcomes) {
                match outcome {
                    Ok(StackOutcome::Completed) => report.succeeded.push(stack.name.clone()),
                    Ok(StackOutcome::Skipped) => report.skipped.push(stack.name.clone()),
                    Err(message) => {
                        error!("Failed to {} stack {}: {}", operation, stack.name, message);
                        report.failed.push(StackFailure {
                            stack: stack.name.clone(),
                            error: message,
                        });
                    }
                }
            }

            if operation.is_fail_fast() && !report.failed.is_empty() {
                break;
            }
        }

        for (_, wave) in waves {
            report
                .not_attempted
                .extend(wave.into_iter().map(|stack| stack.name));
        }
        if !report.not_attempted.is_empty() {
            warn!(
                "Stopped {} after failure; not attempted: {}",
                operation,
                report.not_attempted.join(", ")
            );
        }

        info!("{}", report.summary_line());
        report
    }

    /// Run one wave to completion. Outcomes come back in wave order.
    async fn run_wave(
        &self,
        operation: BulkOperation,
        wave: &[Stack],
        semaphore: Arc<Semaphore>,
        extra_args: Arc<[String]>,
    ) -> Vec<Result<StackOutcome, String>> {
        let mut tasks = JoinSet::new();

        for (position, stack) in wave.iter().cloned().enumerate() {
            let ops = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let extra_args = Arc::clone(&extra_args);

            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => ops
                        .run_one(operation, &stack, &extra_args)
                        .await
                        .map_err(|e| e.to_string()),
                    Err(e) => Err(format!("scheduler closed: {}", e)),
                };
                (position, outcome)
            });
        }

        let mut outcomes: Vec<Option<Result<StackOutcome, String>>> = vec![None; wave.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, outcome)) => outcomes[position] = Some(outcome),
                Err(e) => error!("Stack task did not complete: {}", e),
            }
        }

        outcomes
            .into_iter()
            .map(|outcome| outcome.unwrap_or_else(|| Err("task aborted".to_string())))
            .collect()
    }
}

impl fmt::Debug for StackOperations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackOperations")
            .field("env", &self.env)
            .field("max_parallel", &self.max_parallel)
            .field("terraform", &self.terraform)
            .finish_non_exhaustive()
    }
}
