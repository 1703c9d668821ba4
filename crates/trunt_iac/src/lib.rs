//! # trunt_iac
//!
//! Terraform orchestration for terrarunt.
//!
//! This crate turns a resolved stack graph into terraform runs: it builds the
//! command lines, asks the state backend where state lives, schedules bulk
//! operations wave by wave, and bootstraps the state bucket and identity
//! stacks that every other stack relies on.
//!
//! ## Features
//!
//! - Per-stack `init`/`plan`/`apply`/`destroy` with variable-file discovery
//! - Bulk operations over dependency waves with bounded parallelism
//! - State backend lookups against AWS, LocalStack, or fixed answers
//! - Two-phase bootstrap with guaranteed backend file restoration
//! - Cleanup of terraform-generated artifacts
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trunt_core::{Config, StackRepository};
//! use trunt_iac::{AwsBackendProvider, StackOperations, TerraformCommands};
//! use trunt_runner::{ProcessRunner, ProcessRunnerOptions};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(".".as_ref())?;
//! let repository = Arc::new(StackRepository::from_config(".", &config));
//! let runner = Arc::new(ProcessRunner::new(ProcessRunnerOptions::new()));
//! let terraform = TerraformCommands::new(runner, &config.terraform_bin, ".");
//! let backend = Arc::new(AwsBackendProvider::new(&config).await);
//!
//! let operations = StackOperations::new(repository, terraform, backend, "dev");
//! let report = operations.plan_all(&[]).await?;
//! println!("{}", report.summary_line());
//! # Ok(())
//! # }
//! ```

pub mod aws;
pub mod backend;
pub mod bootstrap;
pub mod cleaner;
pub mod error;
pub mod operations;
pub mod terraform;

pub use aws::AwsBackendProvider;
pub use backend::{
    backend_args, backend_config, state_bucket_name, state_key, BackendInfo, BackendInfoProvider,
    StaticBackendProvider,
};
pub use bootstrap::{
    render_status, BootstrapCoordinator, BootstrapReport, BootstrapStage, LocalBackendOverride,
};
pub use cleaner::{CleanReport, TerraformCleaner};
pub use error::{BackendError, BackendResult, IacError, IacResult};
pub use operations::{BulkOperation, BulkReport, StackFailure, StackOperations, StackOutcome};
pub use terraform::TerraformCommands;
