//! Shared state for one CLI invocation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use tokio::sync::OnceCell;
use tracing::debug;

use trunt_core::{Config, StackRepository};
use trunt_iac::{
    AwsBackendProvider, BackendInfoProvider, BootstrapCoordinator, StackOperations,
    TerraformCommands,
};
use trunt_runner::{DryRunRunner, ProcessRunner, ProcessRunnerOptions, ToolRunner};

use super::Cli;

/// Configuration and collaborators built once from the command line.
pub struct AppContext {
    pub config: Config,
    pub root: PathBuf,
    pub env: String,
    pub dry_run: bool,
    pub repository: Arc<StackRepository>,
    runner: Arc<dyn ToolRunner>,
    recorder: Option<Arc<DryRunRunner>>,
    backend: OnceCell<Arc<dyn BackendInfoProvider>>,
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let root = cli
            .root
            .canonicalize()
            .with_context(|| format!("Stack root {} not found", cli.root.display()))?;

        let mut config = Config::load(&root)?;
        if let Some(bin) = &cli.terraform_bin {
            config = config.with_terraform_bin(bin);
        }
        if let Some(max_parallel) = cli.max_parallel {
            config = config.with_max_parallel(max_parallel);
        }

        Ok(Self::new(config, root, &cli.env, cli.dry_run))
    }

    pub fn new(config: Config, root: PathBuf, env: &str, dry_run: bool) -> Self {
        let repository = Arc::new(StackRepository::from_config(&root, &config));

        let recorder = dry_run.then(|| Arc::new(DryRunRunner::new()));
        let runner: Arc<dyn ToolRunner> = match &recorder {
            Some(recorder) => recorder.clone(),
            None => {
                let options =
                    ProcessRunnerOptions::new().timeout(Duration::from_secs(config.timeout_secs));
                Arc::new(ProcessRunner::new(options))
            }
        };

        debug!("Using terraform binary: {}", config.terraform_bin);

        Self {
            config,
            root,
            env: env.to_string(),
            dry_run,
            repository,
            runner,
            recorder,
            backend: OnceCell::new(),
        }
    }

    /// Use a prepared backend provider instead of AWS.
    pub fn with_backend(self, backend: Arc<dyn BackendInfoProvider>) -> Self {
        let _ = self.backend.set(backend);
        self
    }

    pub fn terraform(&self) -> TerraformCommands {
        TerraformCommands::new(
            Arc::clone(&self.runner),
            &self.config.terraform_bin,
            &self.root,
        )
    }

    /// Backend provider, loading AWS configuration on first use.
    pub async fn backend(&self) -> Arc<dyn BackendInfoProvider> {
        self.backend
            .get_or_init(|| async {
                let provider: Arc<dyn BackendInfoProvider> =
                    Arc::new(AwsBackendProvider::new(&self.config).await);
                provider
            })
            .await
            .clone()
    }

    pub async fn operations(&self) -> StackOperations {
        StackOperations::new(
            Arc::clone(&self.repository),
            self.terraform(),
            self.backend().await,
            &self.env,
        )
        .with_max_parallel(self.config.max_parallel)
    }

    pub async fn bootstrap_coordinator(&self) -> BootstrapCoordinator {
        BootstrapCoordinator::new(
            Arc::clone(&self.repository),
            self.terraform(),
            self.backend().await,
        )
        .with_config(&self.config)
    }

    /// Print the recorded commands when running dry and anything was recorded.
    pub fn print_dry_run_summary(&self) {
        if let Some(recorder) = &self.recorder {
            if !recorder.is_empty() {
                println!("\n{}", recorder.summary());
            }
        }
    }
}
