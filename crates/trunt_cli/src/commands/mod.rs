//! CLI command definitions.
//!
//! Each subcommand maps to one stack, bulk, bootstrap, inspection or cleanup
//! operation. Commands return `Ok(false)` for an operational failure that has
//! already been reported, and `Err` for anything that aborted them.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod bootstrap;
pub mod bulk;
pub mod clean;
pub mod context;
pub mod inspect;
pub mod stack;

use context::AppContext;

/// terrarunt - Terraform stack orchestrator
#[derive(Parser, Debug)]
#[command(name = "terrarunt")]
#[command(version, about = "Terraform stack orchestrator with dependency management")]
#[command(long_about = r#"
terrarunt runs terraform across a tree of stacks in dependency order and
bootstraps the remote state backend those stacks share.

EXAMPLES:
  terrarunt --env dev bootstrap
  terrarunt --env dev plan --stack vpc
  terrarunt --env dev apply-all
  terrarunt --env dev --dry-run destroy-all --confirm

EXIT CODES:
  0   - Success
  1   - Operational failure
  130 - Interrupted
"#)]
pub struct Cli {
    /// Environment (e.g. dev, staging, prod)
    #[arg(long, env = "TERRARUNT_ENV")]
    pub env: String,

    /// Show what would be done without executing
    #[arg(long)]
    pub dry_run: bool,

    /// Path to the terraform binary
    #[arg(long)]
    pub terraform_bin: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Root directory containing the stacks
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Maximum number of stacks run concurrently within a wave
    #[arg(long)]
    pub max_parallel: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a single stack
    Init(stack::StackArgs),

    /// Plan a single stack
    Plan(stack::StackTfArgs),

    /// Apply a single stack
    Apply(stack::StackTfArgs),

    /// Destroy a single stack
    Destroy(stack::StackTfArgs),

    /// Initialize all stacks
    #[command(name = "init-all")]
    InitAll,

    /// Plan all stacks
    #[command(name = "plan-all")]
    PlanAll(bulk::BulkArgs),

    /// Apply all stacks in dependency order
    #[command(name = "apply-all")]
    ApplyAll(bulk::BulkArgs),

    /// Destroy all stacks in reverse dependency order
    #[command(name = "destroy-all")]
    DestroyAll(bulk::DestroyAllArgs),

    /// Bootstrap the state bucket and identity stacks
    Bootstrap(bootstrap::BootstrapArgs),

    /// List all discovered stacks
    #[command(name = "list-stacks")]
    ListStacks(inspect::OutputArgs),

    /// Validate stack configurations
    Validate,

    /// Show the dependency graph
    Graph(inspect::OutputArgs),

    /// Remove terraform artifacts from a stack
    Clean(clean::CleanArgs),

    /// Remove terraform artifacts from every stack
    #[command(name = "clean-all")]
    CleanAll(clean::CleanAllArgs),
}

/// Dispatch a parsed command.
pub async fn execute(command: Commands, context: &AppContext) -> Result<bool> {
    let result = match command {
        Commands::Init(args) => stack::init(args, context).await,
        Commands::Plan(args) => stack::plan(args, context).await,
        Commands::Apply(args) => stack::apply(args, context).await,
        Commands::Destroy(args) => stack::destroy(args, context).await,
        Commands::InitAll => bulk::init_all(context).await,
        Commands::PlanAll(args) => bulk::plan_all(args, context).await,
        Commands::ApplyAll(args) => bulk::apply_all(args, context).await,
        Commands::DestroyAll(args) => bulk::destroy_all(args, context).await,
        Commands::Bootstrap(args) => bootstrap::execute(args, context).await,
        Commands::ListStacks(args) => inspect::list_stacks(args, context),
        Commands::Validate => inspect::validate(context),
        Commands::Graph(args) => inspect::graph(args, context),
        Commands::Clean(args) => clean::clean(args, context),
        Commands::CleanAll(args) => clean::clean_all(args, context),
    };

    context.print_dry_run_summary();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_env_is_required() {
        let result = Cli::try_parse_from(["terrarunt", "list-stacks"]);
        // TERRARUNT_ENV may be set in the environment running the tests
        if std::env::var("TERRARUNT_ENV").is_err() {
            assert!(result.is_err());
        }
    }

    #[test]
    fn test_parse_single_stack_command() {
        let cli = Cli::try_parse_from([
            "terrarunt", "--env", "dev", "--dry-run", "plan", "--stack", "vpc", "--tf-args",
            "-refresh=false", "-lock=false",
        ])
        .unwrap();

        assert_eq!(cli.env, "dev");
        assert!(cli.dry_run);
        match cli.command {
            Commands::Plan(args) => {
                assert_eq!(args.stack, "vpc");
                assert_eq!(args.tf_args, vec!["-refresh=false", "-lock=false"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_bulk_and_globals() {
        let cli = Cli::try_parse_from([
            "terrarunt",
            "--env",
            "prod",
            "--terraform-bin",
            "tflocal",
            "--max-parallel",
            "2",
            "--root",
            "/infra",
            "destroy-all",
            "--confirm",
        ])
        .unwrap();

        assert_eq!(cli.terraform_bin.as_deref(), Some("tflocal"));
        assert_eq!(cli.max_parallel, Some(2));
        assert_eq!(cli.root, PathBuf::from("/infra"));
        assert!(matches!(cli.command, Commands::DestroyAll(ref a) if a.confirm));
    }

    #[test]
    fn test_parse_bootstrap_status() {
        let cli = Cli::try_parse_from(["terrarunt", "--env", "dev", "bootstrap", "--status"]).unwrap();
        assert!(matches!(cli.command, Commands::Bootstrap(ref a) if a.status));
    }
}
