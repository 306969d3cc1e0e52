//! Construction of the [aws_types::SdkConfig](https://docs.rs/aws-types/latest/aws_types/sdk_config/struct.SdkConfig.html)
//! and S3 client, and the settings which tune a copy.

use std::time::Duration;

use anyhow::Result;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::Client;
use aws_types::SdkConfig;
use clap::Args;

use crate::endpoint;
use crate::s3::{RetryPolicy, DEFAULT_MAX_CONCURRENT_COPIES};

/// Create a shared `SdkConfig` with LocalStack support.
///
/// # Example
///
/// ```
/// use s3_part_copy::config::load_from_env;
/// use s3_part_copy::s3::Client;
///
/// # tokio_test::block_on(async {
/// let shared_config = load_from_env(None).await.unwrap();
/// let client = Client::new(&shared_config);
/// # })
/// ```
///
/// ## Endpoints
///
/// If `endpoint_override` is given, every client created from this config
/// talks to that endpoint instead of AWS.
///
/// Otherwise, to communicate with a [LocalStack](https://localstack.cloud/)
/// instance, set the environment variable `LOCALSTACK_HOSTNAME`:
///
/// ```shell
/// $ export LOCALSTACK_HOSTNAME=localhost
/// ```
///
/// You can also optionally set the `EDGE_PORT` variable if you need something other
/// than the default of `4566`.
///
/// ## Errors
///
/// An error will be returned if a valid URI cannot be constructed for the endpoint.
///
pub async fn load_from_env(endpoint_override: Option<&str>) -> Result<SdkConfig> {
    let mut shared_config = aws_config::defaults(BehaviorVersion::latest());
    if let Some(uri) = endpoint::get_endpoint_uri(endpoint_override)? {
        shared_config = shared_config.endpoint_url(uri.to_string());
    }
    Ok(shared_config.load().await)
}

/// Create an S3 [Client] from a shared config.
///
/// Path style addressing is used whenever the config carries an endpoint
/// override. The SDK's own retries are disabled: each request is attempted
/// once and failed parts are retried by [RetryPolicy].
pub fn s3_client(shared_config: &SdkConfig) -> Client {
    let builder = Builder::from(shared_config)
        .force_path_style(shared_config.endpoint_url().is_some())
        .retry_config(RetryConfig::disabled());
    Client::from_conf(builder.build())
}

/// Settings which tune a copy. Every setting can also be provided through
/// the environment.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct CopySettings {
    /// Maximum number of parts copied at the same time.
    #[arg(long, env, default_value_t = DEFAULT_MAX_CONCURRENT_COPIES)]
    pub max_concurrent_copies: usize,

    /// Attempts made for each part before giving up, including the first.
    /// This is the total number of requests sent for a part.
    #[arg(long, env, default_value_t = 3)]
    pub max_attempts: u32,

    /// Delay before the first retry of a part, in milliseconds.
    #[arg(long, env, default_value_t = 200)]
    pub initial_backoff_ms: u64,

    /// Upper bound on the delay between retries, in milliseconds.
    #[arg(long, env, default_value_t = 10_000)]
    pub max_backoff_ms: u64,

    /// Trust the size of part 1 without checking the last part of the source.
    #[arg(long, env)]
    pub skip_layout_verification: bool,

    /// Endpoint of an S3 compatible store to use instead of AWS.
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,
}

impl CopySettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(self.max_attempts)
            .initial_backoff(Duration::from_millis(self.initial_backoff_ms))
            .max_backoff(Duration::from_millis(self.max_backoff_ms))
            .build()
    }
}
