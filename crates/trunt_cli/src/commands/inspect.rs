//! Read-only commands: list-stacks, validate, graph.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use trunt_core::{DependencyResolver, ExecutionPlan, Stack, StackValidator};

use super::context::AppContext;

#[derive(Args, Debug)]
pub struct OutputArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct GraphView<'a> {
    order: Vec<&'a str>,
    waves: Vec<Vec<String>>,
    skip_on_destroy: Vec<&'a str>,
}

pub fn list_stacks(args: OutputArgs, context: &AppContext) -> Result<bool> {
    let stacks = context.repository.discover()?;
    let stacks: Vec<&Stack> = stacks.values().collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stacks)?);
        return Ok(true);
    }

    print!("{}", render_stack_list(&stacks));
    Ok(true)
}

pub fn validate(context: &AppContext) -> Result<bool> {
    let issues = StackValidator::validate_repository(&context.repository);

    if issues.is_empty() {
        println!("All stacks are valid");
        return Ok(true);
    }

    println!("Found {} issue(s):", issues.len());
    for issue in &issues {
        println!("  - {}", issue);
    }
    Ok(false)
}

pub fn graph(args: OutputArgs, context: &AppContext) -> Result<bool> {
    let stacks = context.repository.discover()?;
    let plan = DependencyResolver::new(&stacks).resolve()?;

    if args.json {
        let waves = plan
            .waves()
            .into_iter()
            .map(|wave| wave.into_iter().map(|s| s.name).collect())
            .collect();
        let view = GraphView {
            order: plan.names(),
            waves,
            skip_on_destroy: plan.skip_on_destroy.iter().map(String::as_str).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(true);
    }

    print!("{}", render_graph(&plan));
    Ok(true)
}

fn render_stack_list(stacks: &[&Stack]) -> String {
    let mut out = format!("Found {} stacks:\n", stacks.len());
    for stack in stacks {
        let deps = if stack.dependencies.is_empty() {
            "none".to_string()
        } else {
            stack.dependencies.join(", ")
        };
        let skip = if stack.skip_on_destroy {
            " [skip on destroy]"
        } else {
            ""
        };
        out.push_str(&format!("  {:20} depends on: {}{}\n", stack.name, deps, skip));
        out.push_str(&format!("    Path: {}\n", stack.relative_path));
    }
    out
}

fn render_graph(plan: &ExecutionPlan) -> String {
    let mut out = String::from("Stack Dependency Graph:\n");
    for (i, stack) in plan.ordered.iter().enumerate() {
        let skip = if stack.skip_on_destroy {
            " (skip on destroy)"
        } else {
            ""
        };
        let deps = if stack.dependencies.is_empty() {
            String::new()
        } else {
            format!(" <- {}", stack.dependencies.join(", "))
        };
        out.push_str(&format!("  {:2}. {}{}{}\n", i + 1, stack.name, skip, deps));
    }

    out.push_str("\nExecution waves:\n");
    for (i, wave) in plan.waves().iter().enumerate() {
        let names: Vec<&str> = wave.iter().map(|s| s.name.as_str()).collect();
        out.push_str(&format!("  {:2}. {}\n", i + 1, names.join(", ")));
    }
    out
}
