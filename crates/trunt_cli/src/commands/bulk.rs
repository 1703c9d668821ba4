//! Bulk commands: init-all, plan-all, apply-all, destroy-all.

use std::io::{self, BufRead, Write};

use anyhow::Result;
use clap::Args;

use trunt_iac::BulkReport;

use super::context::AppContext;

#[derive(Args, Debug)]
pub struct BulkArgs {
    /// Additional terraform arguments
    #[arg(long = "tf-args", num_args = 1.., allow_hyphen_values = true)]
    pub tf_args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct DestroyAllArgs {
    /// Additional terraform arguments
    #[arg(long = "tf-args", num_args = 1.., allow_hyphen_values = true)]
    pub tf_args: Vec<String>,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub confirm: bool,
}

pub async fn init_all(context: &AppContext) -> Result<bool> {
    let report = context.operations().await.init_all().await?;
    Ok(print_report(&report))
}

pub async fn plan_all(args: BulkArgs, context: &AppContext) -> Result<bool> {
    let report = context.operations().await.plan_all(&args.tf_args).await?;
    Ok(print_report(&report))
}

pub async fn apply_all(args: BulkArgs, context: &AppContext) -> Result<bool> {
    let report = context.operations().await.apply_all(&args.tf_args).await?;
    Ok(print_report(&report))
}

pub async fn destroy_all(args: DestroyAllArgs, context: &AppContext) -> Result<bool> {
    let operations = context.operations().await;

    if !args.confirm {
        let plan = operations.execution_plan()?;
        let targets = plan.destroy_order();

        println!("This will destroy {} stacks:", targets.len());
        for stack in &targets {
            println!("  - {}", stack.name);
        }
        if !plan.skip_on_destroy.is_empty() {
            let skipped: Vec<&str> = plan.skip_on_destroy.iter().map(String::as_str).collect();
            println!("Skipping: {} (skip_on_destroy=true)", skipped.join(", "));
        }

        if !confirm("\nAre you sure? [y/N]: ").await? {
            println!("Cancelled");
            return Ok(true);
        }
    }

    let report = operations.destroy_all(&args.tf_args).await?;
    Ok(print_report(&report))
}

/// Ask on stdin; anything but `y`/`yes` declines.
async fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let answer = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line).map(|_| line)
    })
    .await??;

    Ok(is_affirmative(&answer))
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn print_report(report: &BulkReport) -> bool {
    println!();
    println!("{}", report.summary_line());
    if !report.skipped.is_empty() {
        println!("  Skipped: {}", report.skipped.join(", "));
    }
    for failure in &report.failed {
        println!("  Failed: {} ({})", failure.stack, failure.error);
    }
    if !report.not_attempted.is_empty() {
        println!("  Not attempted: {}", report.not_attempted.join(", "));
    }
    report.is_success()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_affirmative() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative("YES"));
        assert!(is_affirmative("  yes  "));
        assert!(!is_affirmative("\n"));
        assert!(!is_affirmative("no"));
        assert!(!is_affirmative("yep"));
    }
}
