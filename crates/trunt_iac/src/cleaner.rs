//! Removal of terraform-generated artifacts from stack directories.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info};

use trunt_core::{Stack, StackRepository};

use crate::error::IacResult;

const ARTIFACT_FILES: &[&str] = &[
    ".terraform.lock.hcl",
    "terraform.tfstate.backup",
    "crash.log",
    ".terraformrc",
    "terraform.log",
];

const ARTIFACT_DIRS: &[&str] = &[".terraform"];

const STATE_FILES: &[&str] = &["terraform.tfstate"];

/// What a clean run removed (or would remove, in dry-run).
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanReport {
    pub files: Vec<PathBuf>,
    pub directories: Vec<PathBuf>,
    pub bytes_freed: u64,
    pub errors: Vec<String>,
    /// Stacks cleaned without errors
    pub stacks_cleaned: usize,
    pub stacks_total: usize,
}

impl CleanReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty() && self.errors.is_empty()
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&"=".repeat(60));
        out.push_str("\nCLEAN SUMMARY\n");
        out.push_str(&"=".repeat(60));
        out.push('\n');
        out.push_str(&format!("Files removed: {}\n", self.files.len()));
        out.push_str(&format!("Directories removed: {}\n", self.directories.len()));
        out.push_str(&format!("Space freed: {}\n", format_size(self.bytes_freed)));
        if !self.errors.is_empty() {
            out.push_str(&format!("Errors: {}\n", self.errors.len()));
            for err in &self.errors {
                out.push_str(&format!("  - {}\n", err));
            }
        }
        out.push_str(&"=".repeat(60));
        out.push('\n');
        out
    }
}

/// Deletes caches, lock files and logs terraform leaves in stack directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerraformCleaner {
    dry_run: bool,
    include_state: bool,
}

impl TerraformCleaner {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            include_state: false,
        }
    }

    /// Also delete local `terraform.tfstate` files.
    pub fn include_state(mut self, include: bool) -> Self {
        self.include_state = include;
        self
    }

    pub fn clean_stack(&self, repository: &StackRepository, name: &str) -> IacResult<CleanReport> {
        let stack = repository.get(name)?;
        let mut report = CleanReport {
            stacks_total: 1,
            ..CleanReport::default()
        };
        self.clean_into(&stack, &mut report);
        Ok(report)
    }

    /// Clean every discovered stack; order does not matter here.
    pub fn clean_all(&self, repository: &StackRepository) -> IacResult<CleanReport> {
        let stacks = repository.discover()?;
        info!("Cleaning {} stacks", stacks.len());

        let mut report = CleanReport {
            stacks_total: stacks.len(),
            ..CleanReport::default()
        };
        for stack in stacks.values() {
            self.clean_into(stack, &mut report);
        }

        info!(
            "Cleaning completed: {}/{} successful",
            report.stacks_cleaned, report.stacks_total
        );
        Ok(report)
    }

    fn clean_into(&self, stack: &Stack, report: &mut CleanReport) {
        info!("Cleaning stack: {}", stack.name);
        let errors_before = report.errors.len();

        let state_files: &[&str] = if self.include_state { STATE_FILES } else { &[] };
        for file in ARTIFACT_FILES.iter().chain(state_files) {
            let path = stack.path.join(file);
            if path.is_file() {
                self.remove_file(&path, report);
            }
        }

        for dir in ARTIFACT_DIRS {
            let path = stack.path.join(dir);
            if path.is_dir() {
                self.remove_dir(&path, report);
            }
        }

        if report.errors.len() == errors_before {
            report.stacks_cleaned += 1;
        } else {
            error!("Failed to fully clean stack: {}", stack.name);
        }
    }

    fn remove_file(&self, path: &Path, report: &mut CleanReport) {
        let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);

        if self.dry_run {
            info!("[DRY RUN] Would remove file: {}", path.display());
        } else if let Err(e) = fs::remove_file(path) {
            report
                .errors
                .push(format!("Failed to remove {}: {}", path.display(), e));
            return;
        } else {
            debug!("Removed file: {}", path.display());
        }

        report.files.push(path.to_path_buf());
        report.bytes_freed += size;
    }

    fn remove_dir(&self, path: &Path, report: &mut CleanReport) {
        let size = fs_extra::dir::get_size(path).unwrap_or_else(|e| {
            debug!("Could not size {}: {}", path.display(), e);
            0
        });

        if self.dry_run {
            info!("[DRY RUN] Would remove directory: {}", path.display());
        } else if let Err(e) = fs_extra::dir::remove(path) {
            report
                .errors
                .push(format!("Failed to remove {}: {}", path.display(), e));
            return;
        } else {
            debug!("Removed directory: {}", path.display());
        }

        report.directories.push(path.to_path_buf());
        report.bytes_freed += size;
    }
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} TB", size)
}
