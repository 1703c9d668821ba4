//! Remote state backend information.
//!
//! Bootstrap and `init` need to know which account and region they run
//! against, whether the state bucket exists, and whether a stack already has
//! a remote state object. [`BackendInfoProvider`] abstracts those questions so
//! the AWS implementation can be swapped for fixed answers in tests.

use std::collections::BTreeSet;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::BackendResult;

/// LocalStack's fixed account id.
pub const LOCALSTACK_ACCOUNT_ID: &str = "000000000000";

/// LocalStack edge endpoint.
pub const LOCALSTACK_ENDPOINT: &str = "http://localhost:4566";

/// Account and region the backend lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendInfo {
    pub account_id: String,
    pub region: String,
    pub localstack: bool,
}

impl BackendInfo {
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
            localstack: false,
        }
    }

    pub fn localstack(region: impl Into<String>) -> Self {
        Self {
            account_id: LOCALSTACK_ACCOUNT_ID.to_string(),
            region: region.into(),
            localstack: true,
        }
    }
}

/// Name of the bucket holding every stack's state.
pub fn state_bucket_name(info: &BackendInfo) -> String {
    format!("{}-{}-state", info.account_id, info.region)
}

/// Object key of a stack's state inside the state bucket.
pub fn state_key(env: &str, stack_name: &str) -> String {
    format!("{}/{}/terraform.tfstate", env, stack_name)
}

/// Backend configuration entries for `terraform init`, in a fixed order.
pub fn backend_config(info: &BackendInfo, env: &str, stack_name: &str) -> Vec<(String, String)> {
    let mut config = vec![
        ("bucket".to_string(), state_bucket_name(info)),
        ("key".to_string(), state_key(env, stack_name)),
        ("region".to_string(), info.region.clone()),
        ("encrypt".to_string(), "true".to_string()),
    ];

    if info.localstack {
        for (key, value) in [
            ("access_key", "test"),
            ("secret_key", "test"),
            ("endpoint", LOCALSTACK_ENDPOINT),
            ("skip_credentials_validation", "true"),
            ("skip_metadata_api_check", "true"),
            ("skip_requesting_account_id", "true"),
            ("force_path_style", "true"),
        ] {
            config.push((key.to_string(), value.to_string()));
        }
    }

    config
}

/// `-backend-config=key=value` arguments for a stack.
pub fn backend_args(info: &BackendInfo, env: &str, stack_name: &str) -> Vec<String> {
    backend_config(info, env, stack_name)
        .into_iter()
        .map(|(key, value)| format!("-backend-config={}={}", key, value))
        .collect()
}

/// Source of account identity and state existence answers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackendInfoProvider: Send + Sync {
    /// Account and region of the current credentials.
    async fn identity(&self) -> BackendResult<BackendInfo>;

    /// Whether the given bucket exists.
    async fn bucket_exists(&self, bucket: &str) -> BackendResult<bool>;

    /// Whether a remote state object exists for the stack.
    async fn state_object_exists(&self, env: &str, stack_name: &str) -> BackendResult<bool>;

    /// Backend arguments to pass to `terraform init`.
    async fn backend_cli_args(&self, env: &str, stack_name: &str) -> BackendResult<Vec<String>>;
}

/// Provider with fixed, runtime-adjustable answers.
///
/// Used for offline runs and tests that need a backend whose state changes as
/// stacks are "applied".
#[derive(Debug)]
pub struct StaticBackendProvider {
    info: BackendInfo,
    buckets: RwLock<BTreeSet<String>>,
    state_objects: RwLock<BTreeSet<(String, String)>>,
}

impl StaticBackendProvider {
    pub fn new(info: BackendInfo) -> Self {
        Self {
            info,
            buckets: RwLock::new(BTreeSet::new()),
            state_objects: RwLock::new(BTreeSet::new()),
        }
    }

    /// Mark the state bucket for this provider's identity as present.
    pub fn with_state_bucket(self) -> Self {
        self.add_bucket(state_bucket_name(&self.info));
        self
    }

    pub fn with_state_object(self, env: &str, stack_name: &str) -> Self {
        self.add_state_object(env, stack_name);
        self
    }

    pub fn add_bucket(&self, bucket: impl Into<String>) {
        self.buckets.write().insert(bucket.into());
    }

    pub fn add_state_object(&self, env: &str, stack_name: &str) {
        self.state_objects
            .write()
            .insert((env.to_string(), stack_name.to_string()));
    }

    pub fn remove_state_object(&self, env: &str, stack_name: &str) {
        self.state_objects
            .write()
            .remove(&(env.to_string(), stack_name.to_string()));
    }
}

#[async_trait]
impl BackendInfoProvider for StaticBackendProvider {
    async fn identity(&self) -> BackendResult<BackendInfo> {
        Ok(self.info.clone())
    }

    async fn bucket_exists(&self, bucket: &str) -> BackendResult<bool> {
        Ok(self.buckets.read().contains(bucket))
    }

    async fn state_object_exists(&self, env: &str, stack_name: &str) -> BackendResult<bool> {
        Ok(self
            .state_objects
            .read()
            .contains(&(env.to_string(), stack_name.to_string())))
    }

    async fn backend_cli_args(&self, env: &str, stack_name: &str) -> BackendResult<Vec<String>> {
        Ok(backend_args(&self.info, env, stack_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naming_helpers() {
        let info = BackendInfo::new("123456789012", "eu-west-1");
        assert_eq!(state_bucket_name(&info), "123456789012-eu-west-1-state");
        assert_eq!(state_key("dev", "vpc"), "dev/vpc/terraform.tfstate");
    }

    #[test]
    fn test_backend_args_aws() {
        let info = BackendInfo::new("123456789012", "eu-west-1");
        assert_eq!(
            backend_args(&info, "dev", "vpc"),
            vec![
                "-backend-config=bucket=123456789012-eu-west-1-state",
                "-backend-config=key=dev/vpc/terraform.tfstate",
                "-backend-config=region=eu-west-1",
                "-backend-config=encrypt=true",
            ]
        );
    }

    #[test]
    fn test_backend_args_localstack() {
        let info = BackendInfo::localstack("us-east-1");
        let args = backend_args(&info, "dev", "oidc");

        assert_eq!(args[0], "-backend-config=bucket=000000000000-us-east-1-state");
        assert!(args.contains(&"-backend-config=endpoint=http://localhost:4566".to_string()));
        assert!(args.contains(&"-backend-config=force_path_style=true".to_string()));
        assert_eq!(args.len(), 11);
    }

    #[tokio::test]
    async fn test_static_provider_answers() {
        let provider = StaticBackendProvider::new(BackendInfo::new("111111111111", "us-east-1"))
            .with_state_bucket()
            .with_state_object("dev", "state-file");

        assert!(provider.bucket_exists("111111111111-us-east-1-state").await.unwrap());
        assert!(!provider.bucket_exists("other").await.unwrap());
        assert!(provider.state_object_exists("dev", "state-file").await.unwrap());
        assert!(!provider.state_object_exists("prod", "state-file").await.unwrap());

        provider.remove_state_object("dev", "state-file");
        assert!(!provider.state_object_exists("dev", "state-file").await.unwrap());
    }
}
