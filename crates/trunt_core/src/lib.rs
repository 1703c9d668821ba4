//! # trunt_core
//!
//! Stack discovery and dependency resolution for terrarunt.
//!
//! This crate knows nothing about Terraform itself. It finds stack
//! directories on disk, reads their dependency metadata, and turns the
//! resulting set into an execution plan that respects every declared
//! dependency.
//!
//! # Architecture
//!
//! - **Config**: Explicit configuration assembled from defaults, an optional
//!   `terrarunt.toml`, and the environment
//! - **Stacks**: A stack is a directory plus its `dependencies.json` metadata
//! - **Repository**: Discovers stacks under a root and caches the snapshot
//! - **Graph**: Topological ordering, cycle detection and wave grouping
//! - **Validator**: Non-fatal static checks over a discovered set
//!
//! # Example
//!
//! ```rust,no_run
//! use trunt_core::{Config, DependencyResolver, StackRepository};
//!
//! let config = Config::default();
//! let repository = StackRepository::from_config(".", &config);
//!
//! let stacks = repository.discover()?;
//! let plan = DependencyResolver::new(&stacks).resolve()?;
//!
//! for stack in &plan.ordered {
//!     println!("{}", stack.name);
//! }
//! # Ok::<(), trunt_core::CoreError>(())
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod repository;
pub mod stack;
pub mod validator;

pub use config::{Config, CONFIG_FILE_NAME};
pub use error::{CoreError, CoreResult};
pub use graph::{DependencyResolver, ExecutionPlan};
pub use repository::{StackRepository, StackSet};
pub use stack::{DependencyPaths, Stack, StackMetadata};
pub use validator::StackValidator;
