//! # trunt_runner
//!
//! External tool execution for terrarunt.
//!
//! Every Terraform call goes through the [`ToolRunner`] trait, so callers
//! never care whether a command really runs, is only recorded, or is served
//! by a test double.
//!
//! # Features
//!
//! - **Process Runner**: Spawns the tool, streams combined output line by line,
//!   enforces a timeout and kills the child when it expires
//! - **Dry-Run Mode**: Records invocations and prints a summary instead of executing
//! - **CI Integration**: Timestamped log lines when `CI` is set
//! - **Mock Runner**: For testing without a Terraform binary
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use trunt_runner::{Invocation, ProcessRunner, ProcessRunnerOptions, ToolRunner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = ProcessRunner::new(
//!         ProcessRunnerOptions::new().timeout(Duration::from_secs(600)),
//!     );
//!
//!     let invocation = Invocation::new("terraform")
//!         .arg("plan")
//!         .working_dir("./stacks/vpc");
//!
//!     let result = runner.run(&invocation).await?;
//!     println!("Exit code: {}", result.exit_code);
//!
//!     Ok(())
//! }
//! ```

pub mod dry_run;
pub mod error;
pub mod invocation;
pub mod mock;
pub mod process;
pub mod runner;

pub use dry_run::{DryRunRunner, RecordedInvocation};
pub use error::{RunnerError, RunnerResult};
pub use invocation::Invocation;
pub use mock::{CapturedCall, MockEvent, MockRunner};
pub use process::{
    format_line, LogHandler, LogLine, LogStream, ProcessRunner, ProcessRunnerOptions,
};
pub use runner::{ExecutionResult, ToolRunner};
