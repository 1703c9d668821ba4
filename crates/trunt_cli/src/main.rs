//! terrarunt - Terraform stack orchestrator.
//!
//! Exit codes:
//! - 0: Success
//! - 1: Operational failure
//! - 130: Interrupted by the user

use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::context::AppContext;
use commands::Cli;

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const FAILURE: u8 = 1;
    pub const INTERRUPTED: u8 = 130;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let context = match AppContext::from_cli(&cli) {
        Ok(context) => context,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(ExitCodes::FAILURE);
        }
    };

    init_logging(cli.verbose, &context.config.log_level);

    let result = tokio::select! {
        result = commands::execute(cli.command, &context) => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nOperation cancelled by user");
            return ExitCode::from(ExitCodes::INTERRUPTED);
        }
    };

    match result {
        Ok(true) => ExitCode::from(ExitCodes::SUCCESS),
        Ok(false) => ExitCode::from(ExitCodes::FAILURE),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(ExitCodes::FAILURE)
        }
    }
}

/// `RUST_LOG` wins; otherwise `--verbose` or the configured level applies to
/// terrarunt's own crates and everything else stays at `warn`.
fn init_logging(verbose: bool, configured_level: &str) {
    let level = if verbose { "debug" } else { configured_level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,terrarunt={level},trunt_core={level},trunt_runner={level},trunt_iac={level}",
            level = level
        ))
    });

    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }
}
