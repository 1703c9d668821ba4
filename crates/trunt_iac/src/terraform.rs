//! Terraform command construction.
//!
//! Builds the argument lists for each subcommand, probes for variable files,
//! and hands the finished [`Invocation`] to the configured runner.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use trunt_core::Stack;
use trunt_runner::{ExecutionResult, Invocation, ToolRunner};

use crate::error::IacResult;

/// Terraform front end bound to one runner, binary and root directory.
#[derive(Clone)]
pub struct TerraformCommands {
    runner: Arc<dyn ToolRunner>,
    binary: String,
    root: PathBuf,
}

impl TerraformCommands {
    pub fn new(runner: Arc<dyn ToolRunner>, binary: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            binary: binary.into(),
            root: root.into(),
        }
    }

    pub fn runner(&self) -> &Arc<dyn ToolRunner> {
        &self.runner
    }

    pub fn is_dry_run(&self) -> bool {
        self.runner.is_dry_run()
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Existing variable files for a stack, as `-var-file=` arguments.
    ///
    /// Candidates are probed in a fixed order, shared files first, and absent
    /// ones are skipped.
    pub fn tfvars_args(&self, env: &str, stack_path: &Path) -> Vec<String> {
        let file = format!("{}.tfvars", env);
        let candidates = [
            self.root.join("environment").join(&file),
            self.root.join(&file),
            self.root.join("globals.tfvars"),
            stack_path.join("tfvars").join(&file),
            stack_path.join(&file),
        ];

        candidates
            .iter()
            .filter(|candidate| candidate.is_file())
            .map(|candidate| {
                let resolved = candidate
                    .canonicalize()
                    .unwrap_or_else(|_| candidate.clone());
                debug!("Using tfvars: {}", resolved.display());
                format!("-var-file={}", resolved.display())
            })
            .collect()
    }

    /// `terraform init <backend-args> <var-files>`
    pub async fn init(&self, env: &str, stack: &Stack, backend_args: &[String]) -> IacResult<ExecutionResult> {
        info!("Initializing stack: {}", stack.name);
        let mut args = vec!["init".to_string()];
        args.extend_from_slice(backend_args);
        args.extend(self.tfvars_args(env, &stack.path));
        self.run(&stack.name, &stack.path, args).await
    }

    /// `terraform plan <var-files> <extra>`
    pub async fn plan(&self, env: &str, stack: &Stack, extra_args: &[String]) -> IacResult<ExecutionResult> {
        info!("Planning stack: {}", stack.name);
        let mut args = vec!["plan".to_string()];
        args.extend(self.tfvars_args(env, &stack.path));
        args.extend_from_slice(extra_args);
        self.run(&stack.name, &stack.path, args).await
    }

    /// `terraform apply -auto-approve <var-files> <extra>`
    pub async fn apply(&self, env: &str, stack: &Stack, extra_args: &[String]) -> IacResult<ExecutionResult> {
        info!("Applying stack: {}", stack.name);
        let mut args = vec!["apply".to_string(), "-auto-approve".to_string()];
        args.extend(self.tfvars_args(env, &stack.path));
        args.extend_from_slice(extra_args);
        self.run(&stack.name, &stack.path, args).await
    }

    /// `terraform destroy -auto-approve <var-files> <extra>`
    pub async fn destroy(&self, env: &str, stack: &Stack, extra_args: &[String]) -> IacResult<ExecutionResult> {
        info!("Destroying stack: {}", stack.name);
        let mut args = vec!["destroy".to_string(), "-auto-approve".to_string()];
        args.extend(self.tfvars_args(env, &stack.path));
        args.extend_from_slice(extra_args);
        self.run(&stack.name, &stack.path, args).await
    }

    /// Run an arbitrary terraform command in a stack directory.
    pub async fn run(&self, label: &str, working_dir: &Path, args: Vec<String>) -> IacResult<ExecutionResult> {
        let invocation = Invocation::new(&self.binary)
            .args(args)
            .working_dir(working_dir)
            .label(label);

        debug!("Executing {}", invocation.display_command());
        Ok(self.runner.run(&invocation).await?)
    }
}

impl std::fmt::Debug for TerraformCommands {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerraformCommands")
            .field("binary", &self.binary)
            .field("root", &self.root)
            .field("dry_run", &self.runner.is_dry_run())
            .finish()
    }
}
