//! Clean commands - Remove terraform artifacts.

use anyhow::Result;
use clap::Args;

use trunt_iac::{CleanReport, TerraformCleaner};

use super::context::AppContext;

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Stack name
    #[arg(long)]
    pub stack: String,

    /// Also remove local terraform.tfstate files
    #[arg(long)]
    pub include_state: bool,
}

#[derive(Args, Debug)]
pub struct CleanAllArgs {
    /// Also remove local terraform.tfstate files
    #[arg(long)]
    pub include_state: bool,
}

pub fn clean(args: CleanArgs, context: &AppContext) -> Result<bool> {
    let cleaner = TerraformCleaner::new(context.dry_run).include_state(args.include_state);
    let report = cleaner.clean_stack(&context.repository, &args.stack)?;
    Ok(print_report(&report))
}

pub fn clean_all(args: CleanAllArgs, context: &AppContext) -> Result<bool> {
    let cleaner = TerraformCleaner::new(context.dry_run).include_state(args.include_state);
    let report = cleaner.clean_all(&context.repository)?;
    Ok(print_report(&report))
}

fn print_report(report: &CleanReport) -> bool {
    if report.is_empty() {
        println!("Nothing to clean");
    } else {
        print!("{}", report.summary());
    }
    report.is_success()
}
