//! Bootstrap command - Create the state bucket and identity stacks.

use anyhow::Result;
use clap::Args;

use trunt_iac::BootstrapStage;

use super::context::AppContext;

#[derive(Args, Debug)]
pub struct BootstrapArgs {
    /// Show bootstrap status only
    #[arg(long)]
    pub status: bool,
}

pub async fn execute(args: BootstrapArgs, context: &AppContext) -> Result<bool> {
    let coordinator = context.bootstrap_coordinator().await;

    if args.status {
        print!("{}", coordinator.status(&context.env).await?);
        return Ok(true);
    }

    let current = coordinator.get_current_stage(&context.env).await?;
    if current == BootstrapStage::Completed {
        println!("Bootstrap is already complete");
        return Ok(true);
    }

    println!("Starting bootstrap from stage: {}", current);
    let report = coordinator.bootstrap(&context.env).await?;

    let stages: Vec<&str> = report.stages_run.iter().map(|s| s.as_str()).collect();
    println!(
        "Bootstrap completed successfully ({} -> {}: {})",
        report.initial_stage,
        report.final_stage,
        stages.join(", ")
    );
    Ok(true)
}
