//! The `s3-part-copy` command line interface.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::EnvFilter;

use crate::config::{load_from_env, s3_client, CopySettings};
use crate::s3::{
    CommitOutcome, CopyRequest, LogProgress, S3Object, S3PartCopier, S3Transport, StoreTransport,
};

/// Output format of the logs written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

/// Copy a multipart S3 object, keeping the part layout of the source.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    #[arg(long, env)]
    pub source_bucket: String,

    #[arg(long, env)]
    pub source_key: String,

    #[arg(long, env)]
    pub destination_bucket: String,

    #[arg(long, env)]
    pub destination_key: String,

    #[arg(long, env, value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    #[command(flatten)]
    pub settings: CopySettings,
}

impl Cli {
    pub fn request(&self) -> CopyRequest {
        CopyRequest::new(
            S3Object::new(&self.source_bucket, &self.source_key),
            S3Object::new(&self.destination_bucket, &self.destination_key),
        )
    }

    /// Installs the global tracing subscriber. The filter is read from
    /// `RUST_LOG`, defaulting to `info`.
    pub fn init_tracing(&self) -> Result<()> {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_writer(std::io::stderr);
        match self.log_format {
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Text => builder.try_init(),
        }
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
    }

    /// Runs the copy described by the arguments. The copy is cancelled, and
    /// the destination upload aborted, on Ctrl-C.
    pub async fn run(self) -> Result<CommitOutcome> {
        let shared_config = load_from_env(self.settings.endpoint_url.as_deref())
            .await
            .context("Failed to load AWS configuration")?;
        let transport: Arc<dyn StoreTransport> =
            Arc::new(S3Transport::new(s3_client(&shared_config)));

        let cancellation = CancellationToken::new();
        let copier = S3PartCopier::builder()
            .transport(transport)
            .max_concurrent_copies(self.settings.max_concurrent_copies)
            .retry(self.settings.retry_policy())
            .verify_layout(!self.settings.skip_layout_verification)
            .progress(Arc::new(LogProgress::default()))
            .cancellation(cancellation.clone())
            .build();

        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling copy");
                cancellation.cancel();
            }
        });
        let result = copier.copy_object(&self.request()).await;
        interrupt.abort();

        Ok(result?)
    }
}
