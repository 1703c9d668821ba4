//! Single-stack commands: init, plan, apply, destroy.

use anyhow::Result;
use clap::Args;

use trunt_iac::StackOutcome;

use super::context::AppContext;

#[derive(Args, Debug)]
pub struct StackArgs {
    /// Stack name
    #[arg(long)]
    pub stack: String,
}

#[derive(Args, Debug)]
pub struct StackTfArgs {
    /// Stack name
    #[arg(long)]
    pub stack: String,

    /// Additional terraform arguments
    #[arg(long = "tf-args", num_args = 1.., allow_hyphen_values = true)]
    pub tf_args: Vec<String>,
}

pub async fn init(args: StackArgs, context: &AppContext) -> Result<bool> {
    let operations = context.operations().await;
    operations.init_stack(&args.stack).await?;
    Ok(true)
}

pub async fn plan(args: StackTfArgs, context: &AppContext) -> Result<bool> {
    let operations = context.operations().await;
    operations.plan_stack(&args.stack, &args.tf_args).await?;
    Ok(true)
}

pub async fn apply(args: StackTfArgs, context: &AppContext) -> Result<bool> {
    let operations = context.operations().await;
    operations.apply_stack(&args.stack, &args.tf_args).await?;
    Ok(true)
}

pub async fn destroy(args: StackTfArgs, context: &AppContext) -> Result<bool> {
    let operations = context.operations().await;
    if operations.destroy_stack(&args.stack, &args.tf_args).await? == StackOutcome::Skipped {
        println!("Stack '{}' is marked skip_on_destroy, nothing destroyed", args.stack);
    }
    Ok(true)
}
