//! AWS-backed state backend provider.
//!
//! Identity comes from STS `GetCallerIdentity` and is fetched once per
//! provider. Bucket and state object existence use S3 `HeadBucket` /
//! `HeadObject` and are asked fresh every time, since bootstrap changes them.
//! When the configured binary is `tflocal`, everything points at LocalStack.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use trunt_core::Config;

use crate::backend::{
    backend_args, state_bucket_name, state_key, BackendInfo, BackendInfoProvider,
    LOCALSTACK_ENDPOINT,
};
use crate::error::{BackendError, BackendResult};

const DEFAULT_REGION: &str = "us-east-1";

/// Backend info provider talking to AWS (or LocalStack).
pub struct AwsBackendProvider {
    sdk_config: SdkConfig,
    s3: aws_sdk_s3::Client,
    localstack: bool,
    fallback_region: String,
    identity: OnceCell<BackendInfo>,
}

impl AwsBackendProvider {
    /// Load AWS configuration according to `config`.
    ///
    /// Credentials, profile and region follow the usual SDK resolution chain,
    /// with `aws_region` / `aws_profile` from the config taking precedence.
    pub async fn new(config: &Config) -> Self {
        let localstack = config.is_localstack();
        let fallback_region = config
            .aws_region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.aws_region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(profile) = &config.aws_profile {
            loader = loader.profile_name(profile);
        }
        if localstack {
            info!("LocalStack mode detected");
            loader = loader
                .region(Region::new(fallback_region.clone()))
                .endpoint_url(LOCALSTACK_ENDPOINT)
                .credentials_provider(Credentials::new("test", "test", None, None, "localstack"));
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(localstack)
            .build();

        Self {
            s3: aws_sdk_s3::Client::from_conf(s3_config),
            sdk_config,
            localstack,
            fallback_region,
            identity: OnceCell::new(),
        }
    }

    pub fn is_localstack(&self) -> bool {
        self.localstack
    }

    async fn fetch_identity(&self) -> BackendResult<BackendInfo> {
        let region = self
            .sdk_config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| self.fallback_region.clone());

        if self.localstack {
            return Ok(BackendInfo::localstack(region));
        }

        let sts = aws_sdk_sts::Client::new(&self.sdk_config);
        let identity = sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| BackendError::Credentials(DisplayErrorContext(&e).to_string()))?;

        let account = identity.account().ok_or_else(|| BackendError::Api {
            operation: "GetCallerIdentity".to_string(),
            message: "no account id returned".to_string(),
        })?;

        info!(account_id = %account, region = %region, "AWS account resolved");
        Ok(BackendInfo::new(account, region))
    }
}

#[async_trait]
impl BackendInfoProvider for AwsBackendProvider {
    async fn identity(&self) -> BackendResult<BackendInfo> {
        self.identity
            .get_or_try_init(|| self.fetch_identity())
            .await
            .cloned()
    }

    async fn bucket_exists(&self, bucket: &str) -> BackendResult<bool> {
        debug!(bucket = %bucket, "Checking state bucket");
        match self.s3.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false);
                if not_found || is_http_not_found(&err) {
                    Ok(false)
                } else {
                    Err(BackendError::Api {
                        operation: format!("HeadBucket {}", bucket),
                        message: DisplayErrorContext(&err).to_string(),
                    })
                }
            }
        }
    }

    async fn state_object_exists(&self, env: &str, stack_name: &str) -> BackendResult<bool> {
        let info = self.identity().await?;
        let bucket = state_bucket_name(&info);
        let key = state_key(env, stack_name);
        debug!(bucket = %bucket, key = %key, "Checking state object");

        match self.s3.head_object().bucket(&bucket).key(&key).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false);
                if not_found || is_http_not_found(&err) {
                    Ok(false)
                } else {
                    Err(BackendError::Api {
                        operation: format!("HeadObject s3://{}/{}", bucket, key),
                        message: DisplayErrorContext(&err).to_string(),
                    })
                }
            }
        }
    }

    async fn backend_cli_args(&self, env: &str, stack_name: &str) -> BackendResult<Vec<String>> {
        let info = self.identity().await?;
        Ok(backend_args(&info, env, stack_name))
    }
}

/// HEAD requests carry no error body, so a missing bucket can surface as a
/// bare 404 rather than a modeled error.
fn is_http_not_found<E>(err: &SdkError<E>) -> bool {
    err.raw_response()
        .map(|response| response.status().as_u16() == 404)
        .unwrap_or(false)
}

impl std::fmt::Debug for AwsBackendProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsBackendProvider")
            .field("localstack", &self.localstack)
            .field("region", &self.sdk_config.region())
            .finish_non_exhaustive()
    }
}
