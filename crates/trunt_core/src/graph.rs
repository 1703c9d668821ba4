//! Dependency graph resolution.
//!
//! Edges point from a dependency to its dependents (`vpc -> app` when `app`
//! depends on `vpc`). Ordering is a depth-first topological sort: the DFS
//! post-order is reversed so every dependency precedes its dependents. Nodes
//! are visited in name order, which makes the result reproducible for a given
//! set of stacks.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};
use crate::repository::StackSet;
use crate::stack::Stack;

/// Output of dependency resolution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    /// Stacks with every dependency before its dependents
    pub ordered: Vec<Stack>,
    /// Names of stacks that destroy operations must leave alone
    pub skip_on_destroy: BTreeSet<String>,
}

impl ExecutionPlan {
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.ordered.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.ordered.iter().position(|s| s.name == name)
    }

    pub fn is_skipped_on_destroy(&self, name: &str) -> bool {
        self.skip_on_destroy.contains(name)
    }

    /// Stacks grouped into dependency waves.
    ///
    /// Every stack in wave `n` depends only on stacks from waves `< n`, so a
    /// wave can run concurrently once all earlier waves have finished.
    pub fn waves(&self) -> Vec<Vec<Stack>> {
        let mut levels: HashMap<&str, usize> = HashMap::new();
        let mut waves: Vec<Vec<Stack>> = Vec::new();

        for stack in &self.ordered {
            let level = stack
                .dependencies
                .iter()
                .filter_map(|dep| levels.get(dep.as_str()))
                .map(|level| level + 1)
                .max()
                .unwrap_or(0);
            levels.insert(stack.name.as_str(), level);

            if waves.len() <= level {
                waves.resize_with(level + 1, Vec::new);
            }
            waves[level].push(stack.clone());
        }

        waves
    }

    /// Stacks to destroy, dependents first, with the skip set removed.
    pub fn destroy_order(&self) -> Vec<Stack> {
        self.ordered
            .iter()
            .rev()
            .filter(|s| !self.skip_on_destroy.contains(&s.name))
            .cloned()
            .collect()
    }

    /// Destroy candidates grouped into reverse waves.
    ///
    /// A stack lands one wave after the latest of its (non-skipped) dependents.
    pub fn destroy_waves(&self) -> Vec<Vec<Stack>> {
        let candidates = self.destroy_order();
        let mut levels: HashMap<&str, usize> = HashMap::new();
        let mut waves: Vec<Vec<Stack>> = Vec::new();

        for stack in &candidates {
            let level = candidates
                .iter()
                .filter(|other| other.dependencies.iter().any(|dep| dep == &stack.name))
                .filter_map(|dependent| levels.get(dependent.name.as_str()))
                .map(|level| level + 1)
                .max()
                .unwrap_or(0);
            levels.insert(stack.name.as_str(), level);

            if waves.len() <= level {
                waves.resize_with(level + 1, Vec::new);
            }
            waves[level].push(stack.clone());
        }

        waves
    }
}

/// Builds and sorts the dependency graph of a discovered stack set.
pub struct DependencyResolver<'a> {
    stacks: &'a StackSet,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(stacks: &'a StackSet) -> Self {
        Self { stacks }
    }

    /// Dependency references naming stacks that were not discovered, as
    /// `(stack, missing dependency)` pairs.
    pub fn dangling_references(&self) -> Vec<(String, String)> {
        self.stacks
            .values()
            .flat_map(|stack| {
                stack
                    .dependencies
                    .iter()
                    .filter(|dep| !self.stacks.contains_key(dep.as_str()))
                    .map(move |dep| (stack.name.clone(), dep.clone()))
            })
            .collect()
    }

    /// Order the stacks and collect the destroy skip set.
    ///
    /// Fails with [`CoreError::Dependency`] if the graph contains a cycle.
    /// Unknown dependency references are logged and ignored.
    pub fn resolve(&self) -> CoreResult<ExecutionPlan> {
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut skip_on_destroy = BTreeSet::new();

        for stack in self.stacks.values() {
            dependents.entry(stack.name.as_str()).or_default();
            for dep in &stack.dependencies {
                if !self.stacks.contains_key(dep.as_str()) {
                    warn!(
                        "Stack '{}' depends on unknown stack '{}'",
                        stack.name, dep
                    );
                    continue;
                }
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(stack.name.as_str());
            }
            if stack.skip_on_destroy {
                skip_on_destroy.insert(stack.name.clone());
            }
        }

        let mut sort = TopoSort {
            dependents: &dependents,
            visited: HashSet::new(),
            on_path: Vec::new(),
            post_order: Vec::new(),
        };

        for name in self.stacks.keys() {
            sort.visit(name.as_str())?;
        }

        let ordered: Vec<Stack> = sort
            .post_order
            .iter()
            .rev()
            .filter_map(|name| self.stacks.get(*name).cloned())
            .collect();

        info!(
            "Dependency order: {:?}",
            ordered.iter().map(|s| s.name.as_str()).collect::<Vec<_>>()
        );

        Ok(ExecutionPlan {
            ordered,
            skip_on_destroy,
        })
    }
}

struct TopoSort<'g> {
    dependents: &'g BTreeMap<&'g str, Vec<&'g str>>,
    visited: HashSet<&'g str>,
    on_path: Vec<&'g str>,
    post_order: Vec<&'g str>,
}

impl<'g> TopoSort<'g> {
    fn visit(&mut self, name: &'g str) -> CoreResult<()> {
        if let Some(start) = self.on_path.iter().position(|n| *n == name) {
            let mut cycle: Vec<&str> = self.on_path[start..].to_vec();
            cycle.push(name);
            return Err(CoreError::Dependency(format!(
                "Circular dependency detected involving '{}': {}",
                name,
                cycle.join(" -> ")
            )));
        }
        if self.visited.contains(name) {
            return Ok(());
        }

        let dependents = self.dependents;
        self.on_path.push(name);
        if let Some(next) = dependents.get(name) {
            for &dependent in next {
                self.visit(dependent)?;
            }
        }
        self.on_path.pop();

        self.visited.insert(name);
        self.post_order.push(name);
        Ok(())
    }
}
