//! Stack discovery with a per-instance snapshot cache.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::stack::Stack;

/// Discovered stacks keyed by name. Iteration order is sorted by name.
pub type StackSet = BTreeMap<String, Stack>;

/// Files whose presence marks a directory as a stack, besides the metadata file.
const MARKER_FILES: &[&str] = &["main.tf", "backend.tf"];

/// Discovers stacks under a root directory.
///
/// The first successful [`discover`](Self::discover) is cached; later calls
/// return the same snapshot until [`invalidate`](Self::invalidate) is called.
pub struct StackRepository {
    root: PathBuf,
    stack_file_name: String,
    max_depth: usize,
    cache: Mutex<Option<Arc<StackSet>>>,
}

impl StackRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let defaults = Config::default();
        Self {
            root: root.into(),
            stack_file_name: defaults.stack_file_name,
            max_depth: defaults.max_discovery_depth,
            cache: Mutex::new(None),
        }
    }

    pub fn from_config(root: impl Into<PathBuf>, config: &Config) -> Self {
        Self::new(root)
            .with_stack_file_name(config.stack_file_name.clone())
            .with_max_depth(config.max_discovery_depth)
    }

    pub fn with_stack_file_name(mut self, name: impl Into<String>) -> Self {
        self.stack_file_name = name.into();
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stack_file_name(&self) -> &str {
        &self.stack_file_name
    }

    /// Discover all stacks, using the cached snapshot when present.
    pub fn discover(&self) -> CoreResult<Arc<StackSet>> {
        let mut cache = self.cache.lock();
        if let Some(stacks) = cache.as_ref() {
            return Ok(Arc::clone(stacks));
        }

        let stacks = Arc::new(self.scan()?);
        *cache = Some(Arc::clone(&stacks));
        Ok(stacks)
    }

    /// Drop the cached snapshot so the next discovery rescans the disk.
    pub fn invalidate(&self) {
        debug!("Clearing stack cache");
        *self.cache.lock() = None;
    }

    /// Get a specific stack by name.
    pub fn get(&self, name: &str) -> CoreResult<Stack> {
        let stacks = self.discover()?;
        stacks
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::StackNotFound {
                name: name.to_string(),
                available: stacks.keys().cloned().collect(),
            })
    }

    /// Load a single stack directory, failing on malformed metadata.
    pub fn load_required(&self, path: &Path) -> CoreResult<Stack> {
        Stack::load(path, &self.root, &self.stack_file_name)
    }

    /// Stacks that declare no dependencies.
    pub fn independent_stacks(&self) -> CoreResult<Vec<Stack>> {
        let stacks = self.discover()?;
        Ok(stacks
            .values()
            .filter(|stack| !stack.has_dependencies())
            .cloned()
            .collect())
    }

    fn scan(&self) -> CoreResult<StackSet> {
        if !self.root.is_dir() {
            return Err(CoreError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("stack root {} is not a directory", self.root.display()),
            )));
        }

        info!("Discovering stacks in {:?}", self.root);
        let mut stacks = StackSet::new();

        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(self.max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_hidden(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable path during discovery: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_dir() || !self.is_stack_dir(entry.path()) {
                continue;
            }

            match Stack::load(entry.path(), &self.root, &self.stack_file_name) {
                Ok(stack) => {
                    if let Some(existing) = stacks.get(&stack.name) {
                        warn!(
                            "Duplicate stack name '{}' at {:?}, keeping {:?}",
                            stack.name, stack.path, existing.path
                        );
                        continue;
                    }
                    debug!("Found stack: {} at {:?}", stack.name, stack.path);
                    stacks.insert(stack.name.clone(), stack);
                }
                Err(e) => warn!("Failed to load stack at {:?}: {}", entry.path(), e),
            }
        }

        info!(
            "Discovered {} stacks: {:?}",
            stacks.len(),
            stacks.keys().collect::<Vec<_>>()
        );
        Ok(stacks)
    }

    fn is_stack_dir(&self, path: &Path) -> bool {
        path.join(&self.stack_file_name).is_file()
            || MARKER_FILES.iter().any(|marker| path.join(marker).is_file())
    }
}

impl std::fmt::Debug for StackRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackRepository")
            .field("root", &self.root)
            .field("stack_file_name", &self.stack_file_name)
            .field("max_depth", &self.max_depth)
            .field("cached", &self.cache.lock().is_some())
            .finish()
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_stack(root: &Path, rel: &str, metadata: Option<&str>) -> PathBuf {
        let dir = root.join(rel);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("main.tf"), "# resources").unwrap();
        if let Some(json) = metadata {
            fs::write(dir.join("dependencies.json"), json).unwrap();
        }
        dir
    }

    #[test]
    fn test_discover_finds_stacks() {
        let temp = TempDir::new().unwrap();
        write_stack(temp.path(), "vpc", Some(r#"{"dependencies": {"paths": []}}"#));
        write_stack(temp.path(), "apps/web", Some(r#"{"dependencies": {"paths": ["vpc"]}}"#));
        fs::create_dir_all(temp.path().join("docs")).unwrap();

        let repository = StackRepository::new(temp.path());
        let stacks = repository.discover().unwrap();

        assert_eq!(stacks.keys().collect::<Vec<_>>(), vec!["vpc", "web"]);
        assert_eq!(stacks["web"].dependencies, vec!["vpc"]);
        assert_eq!(stacks["web"].relative_path, "./apps/web");
    }

    #[test]
    fn test_duplicate_names_keep_first_in_walk_order() {
        let temp = TempDir::new().unwrap();
        write_stack(temp.path(), "b/vpc", Some(r#"{"skip_on_destroy": true}"#));
        write_stack(temp.path(), "a/vpc", None);

        let repository = StackRepository::new(temp.path());
        let stacks = repository.discover().unwrap();

        assert_eq!(stacks.len(), 1);
        let vpc = &stacks["vpc"];
        assert!(vpc.path.ends_with("a/vpc"));
        assert_eq!(vpc.relative_path, "./a/vpc");
        assert!(!vpc.skip_on_destroy);
    }

    #[test]
    fn test_discover_is_cached_until_invalidated() {
        let temp = TempDir::new().unwrap();
        write_stack(temp.path(), "vpc", None);

        let repository = StackRepository::new(temp.path());
        let first = repository.discover().unwrap();
        write_stack(temp.path(), "app", None);
        let second = repository.discover().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.len(), 1);

        repository.invalidate();
        let third = repository.discover().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.len(), 2);
    }

    #[test]
    fn test_malformed_metadata_is_skipped() {
        let temp = TempDir::new().unwrap();
        write_stack(temp.path(), "vpc", None);
        let broken = write_stack(temp.path(), "broken", Some("{ not json"));

        let repository = StackRepository::new(temp.path());
        let stacks = repository.discover().unwrap();

        assert!(stacks.contains_key("vpc"));
        assert!(!stacks.contains_key("broken"));

        let err = repository.load_required(&broken).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_depth_limit_and_hidden_dirs() {
        let temp = TempDir::new().unwrap();
        write_stack(temp.path(), "a/b/shallow", None);
        write_stack(temp.path(), "a/b/c/d/too-deep", None);
        write_stack(temp.path(), "vpc/.terraform/modules/inner", None);

        let repository = StackRepository::new(temp.path()).with_max_depth(3);
        let stacks = repository.discover().unwrap();

        assert!(stacks.contains_key("shallow"));
        assert!(!stacks.contains_key("too-deep"));
        assert!(!stacks.contains_key("inner"));
    }

    #[test]
    fn test_get_unknown_stack_lists_available() {
        let temp = TempDir::new().unwrap();
        write_stack(temp.path(), "vpc", None);
        write_stack(temp.path(), "app", None);

        let repository = StackRepository::new(temp.path());
        let err = repository.get("network").unwrap_err();

        match &err {
            CoreError::StackNotFound { name, available } => {
                assert_eq!(name, "network");
                assert_eq!(available, &vec!["app".to_string(), "vpc".to_string()]);
            }
            other => panic!("expected StackNotFound, got {:?}", other),
        }
        assert!(err.to_string().contains("Available: app, vpc"));
    }

    #[test]
    fn test_independent_stacks() {
        let temp = TempDir::new().unwrap();
        write_stack(temp.path(), "vpc", None);
        write_stack(temp.path(), "app", Some(r#"{"dependencies": {"paths": ["vpc"]}}"#));

        let repository = StackRepository::new(temp.path());
        let independent = repository.independent_stacks().unwrap();

        assert_eq!(independent.len(), 1);
        assert_eq!(independent[0].name, "vpc");
    }

    #[test]
    fn test_missing_root() {
        let temp = TempDir::new().unwrap();
        let repository = StackRepository::new(temp.path().join("nope"));
        assert!(matches!(repository.discover(), Err(CoreError::Io(_))));
    }
}
