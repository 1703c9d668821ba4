//! Static validation of a discovered stack set.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::graph::DependencyResolver;
use crate::repository::{StackRepository, StackSet};

const BACKEND_FILE: &str = "backend.tf";

fn backend_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?m)^\s*backend\s+"([A-Za-z0-9_-]+)""#).expect("backend pattern is valid")
    })
}

/// Backend type declared in a stack's `backend.tf` (e.g. `s3`), if any.
pub fn declared_backend_type(stack_path: &Path) -> Option<String> {
    let content = fs::read_to_string(stack_path.join(BACKEND_FILE)).ok()?;
    backend_pattern()
        .captures(&content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Runs non-fatal checks over stacks and reports them as issue strings.
pub struct StackValidator<'a> {
    stacks: &'a StackSet,
}

impl<'a> StackValidator<'a> {
    pub fn new(stacks: &'a StackSet) -> Self {
        Self { stacks }
    }

    /// Discover through the repository and validate the result.
    ///
    /// Discovery failures are reported as an issue rather than returned.
    pub fn validate_repository(repository: &StackRepository) -> Vec<String> {
        match repository.discover() {
            Ok(stacks) => StackValidator::new(&stacks).validate(),
            Err(e) => vec![format!("Stack validation error: {}", e)],
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let resolver = DependencyResolver::new(self.stacks);

        for (stack, dep) in resolver.dangling_references() {
            issues.push(format!("Stack '{}' depends on unknown stack '{}'", stack, dep));
        }

        for stack in self.stacks.values() {
            if !stack.path.join(BACKEND_FILE).is_file() {
                issues.push(format!("Stack '{}' missing {}", stack.name, BACKEND_FILE));
            } else {
                match declared_backend_type(&stack.path) {
                    Some(kind) => debug!("Stack '{}' uses backend '{}'", stack.name, kind),
                    None => issues.push(format!(
                        "Stack '{}' has a {} without a backend block",
                        stack.name, BACKEND_FILE
                    )),
                }
            }

            if !has_terraform_files(&stack.path) {
                warn!("Stack '{}' has no .tf files", stack.name);
                issues.push(format!("Stack '{}' has no .tf files", stack.name));
            }
        }

        if let Err(e) = resolver.resolve() {
            issues.push(e.to_string());
        }

        issues
    }
}

fn has_terraform_files(path: &Path) -> bool {
    let pattern = format!("{}/*.tf", glob::Pattern::escape(&path.to_string_lossy()));

    match glob::glob(&pattern) {
        Ok(mut matches) => matches.any(|entry| entry.is_ok()),
        Err(e) => {
            warn!("Invalid glob pattern for {:?}: {}", path, e);
            false
        }
    }
}
