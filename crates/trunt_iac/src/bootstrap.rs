//! Bootstrap of the state bucket and identity stacks.
//!
//! The state-storage stack creates the bucket that every stack (itself
//! included) keeps its remote state in, so it first has to run with local
//! state and migrate afterwards. The identity stack follows once the bucket
//! exists. Progress is never recorded: the current stage is derived from what
//! the backend reports each time it is asked.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use trunt_core::{Config, StackRepository};

use crate::backend::{state_bucket_name, BackendInfoProvider};
use crate::error::{IacError, IacResult};
use crate::terraform::TerraformCommands;

const BACKEND_FILE: &str = "backend.tf";
const BACKEND_BACKUP_FILE: &str = "backend.tf.backup";

/// Bootstrap progress, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapStage {
    NotStarted,
    StateBucketCreated,
    OidcCreated,
    Completed,
}

impl BootstrapStage {
    /// Derive the stage from what exists in the backend.
    ///
    /// `Completed` only requires both state objects; nothing checks that the
    /// identity stack was applied after the state migration.
    pub fn derive(bucket_exists: bool, identity_state: bool, storage_state: bool) -> Self {
        match (bucket_exists, identity_state, storage_state) {
            (false, _, _) => BootstrapStage::NotStarted,
            (true, false, _) => BootstrapStage::StateBucketCreated,
            (true, true, false) => BootstrapStage::OidcCreated,
            (true, true, true) => BootstrapStage::Completed,
        }
    }

    pub fn all() -> [BootstrapStage; 4] {
        [
            BootstrapStage::NotStarted,
            BootstrapStage::StateBucketCreated,
            BootstrapStage::OidcCreated,
            BootstrapStage::Completed,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapStage::NotStarted => "not_started",
            BootstrapStage::StateBucketCreated => "state_bucket_created",
            BootstrapStage::OidcCreated => "oidc_created",
            BootstrapStage::Completed => "completed",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BootstrapStage::NotStarted => "Not started",
            BootstrapStage::StateBucketCreated => "State bucket created",
            BootstrapStage::OidcCreated => "OIDC stack created",
            BootstrapStage::Completed => "Bootstrap completed",
        }
    }
}

impl fmt::Display for BootstrapStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scoped removal of a stack's remote backend declaration.
///
/// Acquiring renames `backend.tf` to `backend.tf.backup` so terraform falls
/// back to local state. The file is renamed back by [`restore`](Self::restore)
/// or, on any other exit path, when the guard is dropped.
#[derive(Debug)]
pub struct LocalBackendOverride {
    backend: PathBuf,
    backup: PathBuf,
    active: bool,
}

impl LocalBackendOverride {
    pub fn acquire(stack_path: &Path, dry_run: bool) -> io::Result<Self> {
        let mut guard = Self {
            backend: stack_path.join(BACKEND_FILE),
            backup: stack_path.join(BACKEND_BACKUP_FILE),
            active: false,
        };

        if dry_run {
            info!("[DRY RUN] Would disable {}", guard.backend.display());
            return Ok(guard);
        }

        if guard.backup.exists() && !guard.backend.exists() {
            warn!(
                "Found leftover {} from an interrupted run, restoring it",
                guard.backup.display()
            );
            fs::rename(&guard.backup, &guard.backend)?;
        }

        if guard.backend.exists() {
            fs::rename(&guard.backend, &guard.backup)?;
            guard.active = true;
            debug!("Backed up {} to {}", BACKEND_FILE, guard.backup.display());
        } else {
            debug!("No {} in {}, nothing to disable", BACKEND_FILE, stack_path.display());
        }

        Ok(guard)
    }

    /// Whether the backend file is currently moved aside.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Put the backend file back.
    pub fn restore(mut self) -> io::Result<()> {
        self.restore_in_place()
    }

    fn restore_in_place(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }
        fs::rename(&self.backup, &self.backend)?;
        self.active = false;
        debug!("Restored {}", self.backend.display());
        Ok(())
    }
}

impl Drop for LocalBackendOverride {
    fn drop(&mut self) {
        if let Err(e) = self.restore_in_place() {
            error!(
                "Failed to restore {} from {}: {}",
                self.backend.display(),
                self.backup.display(),
                e
            );
        }
    }
}

/// What a bootstrap run did.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapReport {
    pub initial_stage: BootstrapStage,
    pub final_stage: BootstrapStage,
    /// Stages reached during this run, in order
    pub stages_run: Vec<BootstrapStage>,
}

impl BootstrapReport {
    pub fn was_noop(&self) -> bool {
        self.stages_run.is_empty()
    }
}

/// Drives the bootstrap stage machine for one environment at a time.
pub struct BootstrapCoordinator {
    repository: Arc<StackRepository>,
    terraform: TerraformCommands,
    backend: Arc<dyn BackendInfoProvider>,
    state_stack: String,
    identity_stack: String,
}

impl BootstrapCoordinator {
    pub fn new(
        repository: Arc<StackRepository>,
        terraform: TerraformCommands,
        backend: Arc<dyn BackendInfoProvider>,
    ) -> Self {
        let defaults = Config::default();
        Self {
            repository,
            terraform,
            backend,
            state_stack: defaults.state_stack,
            identity_stack: defaults.identity_stack,
        }
    }

    /// Use the stack names from configuration.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.state_stack = config.state_stack.clone();
        self.identity_stack = config.identity_stack.clone();
        self
    }

    pub fn state_stack(&self) -> &str {
        &self.state_stack
    }

    pub fn identity_stack(&self) -> &str {
        &self.identity_stack
    }

    /// Query the backend for the current stage.
    pub async fn get_current_stage(&self, env: &str) -> IacResult<BootstrapStage> {
        let info = self.backend.identity().await?;
        let bucket = state_bucket_name(&info);

        let bucket_exists = self.backend.bucket_exists(&bucket).await?;
        if !bucket_exists {
            debug!("State bucket {} does not exist", bucket);
            return Ok(BootstrapStage::NotStarted);
        }

        let identity_state = self
            .backend
            .state_object_exists(env, &self.identity_stack)
            .await?;
        let storage_state = self
            .backend
            .state_object_exists(env, &self.state_stack)
            .await?;

        Ok(BootstrapStage::derive(true, identity_state, storage_state))
    }

    /// Run every stage that is not yet satisfied.
    ///
    /// A failing stage aborts the run with [`IacError::Bootstrap`] naming the
    /// stage that was being left; completed stages are not rolled back.
    pub async fn bootstrap(&self, env: &str) -> IacResult<BootstrapReport> {
        let initial_stage = self.get_current_stage(env).await?;
        info!("Starting bootstrap for {} from stage: {}", env, initial_stage);

        let mut stage = initial_stage;
        let mut stages_run = Vec::new();

        if stage == BootstrapStage::NotStarted {
            self.create_state_bucket(env)
                .await
                .map_err(|e| stage_error(stage, "creating the state bucket", e))?;
            stage = BootstrapStage::StateBucketCreated;
            stages_run.push(stage);
        }

        if stage == BootstrapStage::StateBucketCreated {
            self.create_identity_stack(env)
                .await
                .map_err(|e| stage_error(stage, "applying the identity stack", e))?;
            stage = BootstrapStage::OidcCreated;
            stages_run.push(stage);
        }

        if stage == BootstrapStage::OidcCreated {
            // The state bucket run already migrated its state when it started
            // from scratch; otherwise check before migrating again.
            let migrated = initial_stage == BootstrapStage::NotStarted
                || self
                    .backend
                    .state_object_exists(env, &self.state_stack)
                    .await
                    .map_err(|e| stage_error(stage, "checking state migration", e.into()))?;

            if !migrated {
                self.migrate_state_storage(env)
                    .await
                    .map_err(|e| stage_error(stage, "migrating state-storage state", e))?;
            }
            stage = BootstrapStage::Completed;
            stages_run.push(stage);
        }

        if stages_run.is_empty() {
            info!("Bootstrap already completed for {}", env);
        } else {
            info!("Bootstrap completed for {}", env);
        }

        Ok(BootstrapReport {
            initial_stage,
            final_stage: stage,
            stages_run,
        })
    }

    /// Human-readable stage table for `bootstrap --status`.
    pub async fn status(&self, env: &str) -> IacResult<String> {
        let stage = self.get_current_stage(env).await?;
        Ok(render_status(env, stage))
    }

    /// Local-state apply of the state-storage stack, then migrate its state
    /// into the bucket it just created.
    async fn create_state_bucket(&self, env: &str) -> IacResult<()> {
        info!("Stage 1: creating state bucket with local state");
        let stack = self.repository.get(&self.state_stack)?;

        let guard = LocalBackendOverride::acquire(&stack.path, self.terraform.is_dry_run())?;
        self.terraform.init(env, &stack, &[]).await?;
        self.terraform.apply(env, &stack, &[]).await?;
        guard.restore()?;

        self.migrate_state_storage(env).await
    }

    async fn create_identity_stack(&self, env: &str) -> IacResult<()> {
        info!("Stage 2: creating identity stack using remote state");
        let stack = self.repository.get(&self.identity_stack)?;

        let backend_args = self.backend.backend_cli_args(env, &stack.name).await?;
        self.terraform.init(env, &stack, &backend_args).await?;
        self.terraform.apply(env, &stack, &[]).await?;
        Ok(())
    }

    async fn migrate_state_storage(&self, env: &str) -> IacResult<()> {
        info!("Migrating {} state to the remote backend", self.state_stack);
        let stack = self.repository.get(&self.state_stack)?;

        let mut args = vec![
            "init".to_string(),
            "-migrate-state".to_string(),
            "-force-copy".to_string(),
        ];
        args.extend(self.backend.backend_cli_args(env, &stack.name).await?);
        self.terraform.run(&stack.name, &stack.path, args).await?;
        Ok(())
    }
}

impl fmt::Debug for BootstrapCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapCoordinator")
            .field("state_stack", &self.state_stack)
            .field("identity_stack", &self.identity_stack)
            .finish_non_exhaustive()
    }
}

fn stage_error(stage: BootstrapStage, action: &str, err: IacError) -> IacError {
    error!("Bootstrap failed at {} while {}: {}", stage, action, err);
    IacError::Bootstrap {
        stage,
        message: format!("{}: {}", action, err),
    }
}

/// Render the stage table with done / current / pending markers.
pub fn render_status(env: &str, current: BootstrapStage) -> String {
    let mut out = format!("\nBootstrap Status for Environment: {}\n", env);
    out.push_str(&"=".repeat(50));
    out.push('\n');

    for stage in BootstrapStage::all() {
        let line = if stage == current {
            format!("[>] {:25} {} (CURRENT)", stage.as_str(), stage.description())
        } else if stage < current {
            format!("[x] {:25} {}", stage.as_str(), stage.description())
        } else {
            format!("[ ] {:25} {}", stage.as_str(), stage.description())
        };
        out.push_str(&line);
        out.push('\n');
    }
    out.push('\n');

    if current == BootstrapStage::Completed {
        out.push_str("Bootstrap is complete.\n");
    } else {
        out.push_str(&format!(
            "Next: run 'terrarunt --env {} bootstrap' to continue\n",
            env
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendInfo, MockBackendInfoProvider};
    use tempfile::TempDir;
    use trunt_runner::MockRunner;

    fn mock_backend(bucket: bool, identity: bool, storage: bool) -> MockBackendInfoProvider {
        let mut backend = MockBackendInfoProvider::new();
        backend
            .expect_identity()
            .returning(|| Ok(BackendInfo::new("123456789012", "us-east-1")));
        backend
            .expect_bucket_exists()
            .returning(move |name| Ok(bucket && name == "123456789012-us-east-1-state"));
        backend
            .expect_state_object_exists()
            .returning(move |_env, stack| {
                Ok(match stack {
                    "oidc" => identity,
                    "state-file" => storage,
                    _ => false,
                })
            });
        backend
            .expect_backend_cli_args()
            .returning(|env, stack| Ok(vec![format!("-backend-config=key={}/{}/terraform.tfstate", env, stack)]));
        backend
    }

    fn write_stack(root: &Path, name: &str, with_backend: bool) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("main.tf"), "").unwrap();
        if with_backend {
            fs::write(dir.join(BACKEND_FILE), "terraform {\n  backend \"s3\" {}\n}\n").unwrap();
        }
    }

    fn coordinator(root: &Path, runner: &MockRunner, backend: MockBackendInfoProvider) -> BootstrapCoordinator {
        let repository = Arc::new(StackRepository::new(root));
        let terraform = TerraformCommands::new(Arc::new(runner.clone()), "terraform", root);
        BootstrapCoordinator::new(repository, terraform, Arc::new(backend))
    }

    #[test]
    fn test_stage_derivation() {
        assert_eq!(BootstrapStage::derive(false, false, false), BootstrapStage::NotStarted);
        assert_eq!(BootstrapStage::derive(false, true, true), BootstrapStage::NotStarted);
        assert_eq!(BootstrapStage::derive(true, false, false), BootstrapStage::StateBucketCreated);
        assert_eq!(BootstrapStage::derive(true, false, true), BootstrapStage::StateBucketCreated);
        assert_eq!(BootstrapStage::derive(true, true, false), BootstrapStage::OidcCreated);
        assert_eq!(BootstrapStage::derive(true, true, true), BootstrapStage::Completed);
    }

    #[tokio::test]
    async fn test_current_stage_from_provider() {
        let temp = TempDir::new().unwrap();
        let runner = MockRunner::new();

        let cases = [
            ((false, false, false), BootstrapStage::NotStarted),
            ((true, false, false), BootstrapStage::StateBucketCreated),
            ((true, true, false), BootstrapStage::OidcCreated),
            ((true, true, true), BootstrapStage::Completed),
        ];
        for ((bucket, identity, storage), expected) in cases {
            let coordinator = coordinator(temp.path(), &runner, mock_backend(bucket, identity, storage));
            assert_eq!(coordinator.get_current_stage("dev").await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_provider_errors_propagate() {
        let temp = TempDir::new().unwrap();
        let mut backend = MockBackendInfoProvider::new();
        backend
            .expect_identity()
            .returning(|| Err(crate::error::BackendError::Credentials("no credentials".into())));

        let coordinator = coordinator(temp.path(), &MockRunner::new(), backend);
        let err = coordinator.get_current_stage("dev").await.unwrap_err();
        assert!(matches!(err, IacError::Backend(_)));
    }

    #[tokio::test]
    async fn test_full_bootstrap_sequence() {
        let temp = TempDir::new().unwrap();
        write_stack(temp.path(), "state-file", true);
        write_stack(temp.path(), "oidc", true);
        let runner = MockRunner::new();

        let coordinator = coordinator(temp.path(), &runner, mock_backend(false, false, false));
        let report = coordinator.bootstrap("dev").await.unwrap();

        assert_eq!(report.initial_stage, BootstrapStage::NotStarted);
        assert_eq!(report.final_stage, BootstrapStage::Completed);
        assert_eq!(
            report.stages_run,
            vec![
                BootstrapStage::StateBucketCreated,
                BootstrapStage::OidcCreated,
                BootstrapStage::Completed,
            ]
        );

        let calls = runner.get_calls();
        let summary: Vec<(String, String)> = calls
            .iter()
            .map(|c| (c.dir_name.clone(), c.args[0].clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("state-file".to_string(), "init".to_string()),
                ("state-file".to_string(), "apply".to_string()),
                ("state-file".to_string(), "init".to_string()),
                ("oidc".to_string(), "init".to_string()),
                ("oidc".to_string(), "apply".to_string()),
            ]
        );
        assert!(!calls[0].args.iter().any(|a| a.starts_with("-backend-config")));
        assert!(calls[2].has_arg("-migrate-state") && calls[2].has_arg("-force-copy"));
        assert!(calls[2].has_arg("-backend-config=key=dev/state-file/terraform.tfstate"));
        assert!(calls[3].has_arg("-backend-config=key=dev/oidc/terraform.tfstate"));

        let state_dir = temp.path().join("state-file");
        assert!(state_dir.join(BACKEND_FILE).exists());
        assert!(!state_dir.join(BACKEND_BACKUP_FILE).exists());
    }

    #[tokio::test]
    async fn test_bootstrap_resumes_from_bucket_created() {
        let temp = TempDir::new().unwrap();
        write_stack(temp.path(), "state-file", true);
        write_stack(temp.path(), "oidc", true);
        let runner = MockRunner::new();

        let coordinator = coordinator(temp.path(), &runner, mock_backend(true, false, true));
        let report = coordinator.bootstrap("dev").await.unwrap();

        assert_eq!(report.initial_stage, BootstrapStage::StateBucketCreated);
        assert_eq!(report.final_stage, BootstrapStage::Completed);
        assert_eq!(runner.dirs_for("apply"), vec!["oidc"]);
        assert!(runner.get_calls().iter().all(|c| !c.has_arg("-migrate-state")));
    }

    #[tokio::test]
    async fn test_bootstrap_from_oidc_created_migrates_storage_state() {
        let temp = TempDir::new().unwrap();
        write_stack(temp.path(), "state-file", true);
        write_stack(temp.path(), "oidc", true);
        let runner = MockRunner::new();

        let coordinator = coordinator(temp.path(), &runner, mock_backend(true, true, false));
        let report = coordinator.bootstrap("dev").await.unwrap();

        assert_eq!(report.stages_run, vec![BootstrapStage::Completed]);
        let calls = runner.get_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].dir_name, "state-file");
        assert!(calls[0].has_arg("-migrate-state"));
    }

    #[tokio::test]
    async fn test_bootstrap_noop_when_completed() {
        let temp = TempDir::new().unwrap();
        let runner = MockRunner::new();

        let coordinator = coordinator(temp.path(), &runner, mock_backend(true, true, true));
        let report = coordinator.bootstrap("dev").await.unwrap();

        assert!(report.was_noop());
        assert_eq!(report.final_stage, BootstrapStage::Completed);
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_backend_restored_when_apply_fails() {
        let temp = TempDir::new().unwrap();
        write_stack(temp.path(), "state-file", true);
        write_stack(temp.path(), "oidc", true);
        let runner = MockRunner::new().fail_when("state-file", "apply");

        let coordinator = coordinator(temp.path(), &runner, mock_backend(false, false, false));
        let err = coordinator.bootstrap("dev").await.unwrap_err();

        match err {
            IacError::Bootstrap { stage, message } => {
                assert_eq!(stage, BootstrapStage::NotStarted);
                assert!(message.contains("creating the state bucket"));
            }
            other => panic!("expected bootstrap error, got {:?}", other),
        }

        let state_dir = temp.path().join("state-file");
        assert!(state_dir.join(BACKEND_FILE).exists());
        assert!(!state_dir.join(BACKEND_BACKUP_FILE).exists());
        assert!(runner.dirs_for("apply").iter().all(|d| d != "oidc"));
    }

    #[tokio::test]
    async fn test_stage_two_failure_reports_stage() {
        let temp = TempDir::new().unwrap();
        write_stack(temp.path(), "state-file", true);
        write_stack(temp.path(), "oidc", true);
        let runner = MockRunner::new().fail_when("oidc", "apply");

        let coordinator = coordinator(temp.path(), &runner, mock_backend(true, false, true));
        let err = coordinator.bootstrap("dev").await.unwrap_err();

        assert!(matches!(
            err,
            IacError::Bootstrap {
                stage: BootstrapStage::StateBucketCreated,
                ..
            }
        ));
    }

    #[test]
    fn test_override_guard_restores_on_drop() {
        let temp = TempDir::new().unwrap();
        write_stack(temp.path(), "state-file", true);
        let dir = temp.path().join("state-file");

        {
            let guard = LocalBackendOverride::acquire(&dir, false).unwrap();
            assert!(guard.is_active());
            assert!(!dir.join(BACKEND_FILE).exists());
            assert!(dir.join(BACKEND_BACKUP_FILE).exists());
        }

        assert!(dir.join(BACKEND_FILE).exists());
        assert!(!dir.join(BACKEND_BACKUP_FILE).exists());
    }

    #[test]
    fn test_override_guard_recovers_leftover_backup() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("state-file");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(BACKEND_BACKUP_FILE), "terraform {}").unwrap();

        let guard = LocalBackendOverride::acquire(&dir, false).unwrap();
        assert!(guard.is_active());
        guard.restore().unwrap();

        assert_eq!(fs::read_to_string(dir.join(BACKEND_FILE)).unwrap(), "terraform {}");
        assert!(!dir.join(BACKEND_BACKUP_FILE).exists());
    }

    #[test]
    fn test_override_guard_dry_run_leaves_files() {
        let temp = TempDir::new().unwrap();
        write_stack(temp.path(), "state-file", true);
        let dir = temp.path().join("state-file");

        let guard = LocalBackendOverride::acquire(&dir, true).unwrap();
        assert!(!guard.is_active());
        assert!(dir.join(BACKEND_FILE).exists());
        assert!(!dir.join(BACKEND_BACKUP_FILE).exists());
    }

    #[test]
    fn test_render_status_markers() {
        let status = render_status("dev", BootstrapStage::StateBucketCreated);
        assert!(status.contains("Bootstrap Status for Environment: dev"));
        assert!(status.contains("[x] not_started"));
        assert!(status.contains("[>] state_bucket_created"));
        assert!(status.contains("(CURRENT)"));
        assert!(status.contains("[ ] completed"));
        assert!(status.contains("terrarunt --env dev bootstrap"));

        let done = render_status("prod", BootstrapStage::Completed);
        assert!(done.contains("Bootstrap is complete."));
    }
}
