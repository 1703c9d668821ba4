//! Stack model and metadata loading.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CoreError, CoreResult};

/// `dependencies` block of a stack metadata file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyPaths {
    #[serde(default)]
    pub paths: Vec<String>,
}

/// Raw contents of a stack metadata file (`dependencies.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackMetadata {
    #[serde(default)]
    pub dependencies: DependencyPaths,
    #[serde(default)]
    pub skip_on_destroy: bool,
}

impl StackMetadata {
    /// Parse metadata from JSON text. `path` is only used for error reporting.
    pub fn parse(content: &str, path: &Path) -> CoreResult<Self> {
        serde_json::from_str(content).map_err(|e| CoreError::InvalidConfiguration {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// A deployable unit of infrastructure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stack {
    /// Unique name, taken from the directory name
    pub name: String,
    /// Directory holding the stack
    pub path: PathBuf,
    /// Path relative to the discovery root, `./`-prefixed
    pub relative_path: String,
    /// Names of the stacks this one depends on
    pub dependencies: Vec<String>,
    /// Excluded from destroy operations
    pub skip_on_destroy: bool,
}

impl Stack {
    /// Load a stack from its directory.
    ///
    /// A missing metadata file yields a stack without dependencies; malformed
    /// JSON is an [`CoreError::InvalidConfiguration`] naming the file.
    pub fn load(path: &Path, root: &Path, stack_file_name: &str) -> CoreResult<Self> {
        let name = directory_name(path)?;
        let metadata_path = path.join(stack_file_name);

        let metadata = if metadata_path.is_file() {
            let content = fs::read_to_string(&metadata_path)?;
            StackMetadata::parse(&content, &metadata_path)?
        } else {
            StackMetadata::default()
        };

        Ok(Self::from_metadata(name, path, root, metadata))
    }

    /// Build a stack from already-parsed metadata.
    pub fn from_metadata(
        name: impl Into<String>,
        path: &Path,
        root: &Path,
        metadata: StackMetadata,
    ) -> Self {
        let name = name.into();
        let mut dependencies: Vec<String> = Vec::new();

        for raw in &metadata.dependencies.paths {
            let Some(dep) = normalize_dependency(raw) else {
                warn!("Stack '{}' has an empty dependency entry, ignoring", name);
                continue;
            };
            if dep == name {
                warn!("Stack '{}' lists itself as a dependency, ignoring", name);
                continue;
            }
            if !dependencies.contains(&dep) {
                dependencies.push(dep);
            }
        }

        let relative_path = match path.strip_prefix(root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => format!("./{}", rel.display()),
            Err(_) => path.display().to_string(),
        };

        Self {
            name,
            path: path.to_path_buf(),
            relative_path,
            dependencies,
            skip_on_destroy: metadata.skip_on_destroy,
        }
    }

    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty()
    }
}

/// Only the last path component of a dependency entry names the stack.
fn normalize_dependency(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches(['/', '\\']);
    Path::new(trimmed)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(|name| name.to_string())
}

fn directory_name(path: &Path) -> CoreResult<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
        .ok_or_else(|| CoreError::InvalidConfiguration {
            path: path.to_path_buf(),
            message: "stack directory has no usable name".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_metadata_defaults() {
        let metadata = StackMetadata::parse("{}", Path::new("dependencies.json")).unwrap();
        assert!(metadata.dependencies.paths.is_empty());
        assert!(!metadata.skip_on_destroy);
    }

    #[test]
    fn test_dependency_paths_are_normalized() {
        let metadata = StackMetadata {
            dependencies: DependencyPaths {
                paths: vec![
                    "../network/vpc".to_string(),
                    "./security-groups/".to_string(),
                    "vpc".to_string(),
                ],
            },
            skip_on_destroy: false,
        };

        let stack = Stack::from_metadata("app", Path::new("/infra/app"), Path::new("/infra"), metadata);
        assert_eq!(stack.dependencies, vec!["vpc", "security-groups"]);
        assert_eq!(stack.relative_path, "./app");
    }

    #[test]
    fn test_self_dependency_is_dropped() {
        let metadata = StackMetadata {
            dependencies: DependencyPaths {
                paths: vec!["stacks/app".to_string()],
            },
            skip_on_destroy: true,
        };

        let stack = Stack::from_metadata("app", Path::new("/infra/app"), Path::new("/infra"), metadata);
        assert!(stack.dependencies.is_empty());
        assert!(stack.skip_on_destroy);
    }

    #[test]
    fn test_load_malformed_json_names_file() {
        let dir = TempDir::new().unwrap();
        let stack_dir = dir.path().join("broken");
        fs::create_dir(&stack_dir).unwrap();
        fs::write(stack_dir.join("dependencies.json"), "{ \"dependencies\": ").unwrap();

        let err = Stack::load(&stack_dir, dir.path(), "dependencies.json").unwrap_err();
        match &err {
            CoreError::InvalidConfiguration { path, .. } => {
                assert_eq!(path, &stack_dir.join("dependencies.json"));
            }
            other => panic!("expected InvalidConfiguration, got {:?}", other),
        }
        assert!(err.to_string().contains("dependencies.json"));
    }

    #[test]
    fn test_load_without_metadata_file() {
        let dir = TempDir::new().unwrap();
        let stack_dir = dir.path().join("vpc");
        fs::create_dir(&stack_dir).unwrap();
        fs::write(stack_dir.join("main.tf"), "# vpc").unwrap();

        let stack = Stack::load(&stack_dir, dir.path(), "dependencies.json").unwrap();
        assert_eq!(stack.name, "vpc");
        assert!(!stack.has_dependencies());
        assert!(!stack.skip_on_destroy);
    }
}
