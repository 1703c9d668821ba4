//! Runtime configuration.
//!
//! A [`Config`] is built once at start-up and handed to every component that
//! needs it. Values are layered: built-in defaults, then an optional
//! `terrarunt.toml` in the root directory, then `TERRARUNT_*` / `AWS_*`
//! environment variables. Command-line flags are applied last by the binary.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Name of the optional configuration file looked up in the root directory.
pub const CONFIG_FILE_NAME: &str = "terrarunt.toml";

/// Terrarunt configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Terraform binary (name on PATH or absolute path)
    pub terraform_bin: String,
    /// AWS region override
    pub aws_region: Option<String>,
    /// AWS named profile
    pub aws_profile: Option<String>,
    /// Per-stack metadata file name
    pub stack_file_name: String,
    /// How many directory levels below the root are searched for stacks
    pub max_discovery_depth: usize,
    /// Upper bound on concurrently running stacks within one wave
    pub max_parallel: usize,
    /// Per-invocation timeout for the external tool, in seconds
    pub timeout_secs: u64,
    /// Default log level when RUST_LOG is not set
    pub log_level: String,
    /// Stack that owns the remote state bucket
    pub state_stack: String,
    /// Identity/federation stack bootstrapped right after the state bucket
    pub identity_stack: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            terraform_bin: "terraform".to_string(),
            aws_region: None,
            aws_profile: None,
            stack_file_name: "dependencies.json".to_string(),
            max_discovery_depth: 4,
            max_parallel: 4,
            timeout_secs: 3600,
            log_level: "info".to_string(),
            state_stack: "state-file".to_string(),
            identity_stack: "oidc".to_string(),
        }
    }
}

impl Config {
    /// Load configuration for a root directory from the file and the process
    /// environment.
    pub fn load(root: &Path) -> CoreResult<Self> {
        let config = Self::from_file_or_default(root)?;
        config.with_env(|name| std::env::var(name).ok())
    }

    /// Read `terrarunt.toml` from `root`, or fall back to defaults when absent.
    pub fn from_file_or_default(root: &Path) -> CoreResult<Self> {
        let path = root.join(CONFIG_FILE_NAME);
        if !path.is_file() {
            return Ok(Self::default());
        }

        debug!("Loading configuration from {:?}", path);
        let content = fs::read_to_string(&path)?;
        toml::from_str(&content).map_err(|e| CoreError::InvalidConfiguration {
            path,
            message: e.to_string(),
        })
    }

    /// Overlay environment variables using the given lookup.
    pub fn with_env<F>(mut self, lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bin) = lookup("TERRARUNT_TERRAFORM_BIN") {
            self.terraform_bin = bin;
        }
        if let Some(region) = lookup("AWS_REGION") {
            self.aws_region = Some(region);
        }
        if let Some(profile) = lookup("AWS_PROFILE") {
            self.aws_profile = Some(profile);
        }
        if let Some(file) = lookup("TERRARUNT_STACK_FILE") {
            self.stack_file_name = file;
        }
        if let Some(level) = lookup("TERRARUNT_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(depth) = lookup("TERRARUNT_MAX_DEPTH") {
            self.max_discovery_depth = parse_setting("TERRARUNT_MAX_DEPTH", &depth)?;
        }
        if let Some(parallel) = lookup("TERRARUNT_MAX_PARALLEL") {
            self.max_parallel = parse_setting("TERRARUNT_MAX_PARALLEL", &parallel)?;
        }
        if let Some(timeout) = lookup("TERRARUNT_TIMEOUT") {
            self.timeout_secs = parse_setting("TERRARUNT_TIMEOUT", &timeout)?;
        }
        Ok(self)
    }

    pub fn with_terraform_bin(mut self, bin: impl Into<String>) -> Self {
        self.terraform_bin = bin.into();
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    pub fn with_max_discovery_depth(mut self, depth: usize) -> Self {
        self.max_discovery_depth = depth;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Whether the configured binary is the LocalStack `tflocal` wrapper.
    pub fn is_localstack(&self) -> bool {
        Path::new(&self.terraform_bin)
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.eq_ignore_ascii_case("tflocal"))
            .unwrap_or(false)
    }
}

fn parse_setting<T>(name: &str, raw: &str) -> CoreResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| CoreError::InvalidSetting {
        name: name.to_string(),
        message: format!("'{}': {}", raw, e),
    })
}
