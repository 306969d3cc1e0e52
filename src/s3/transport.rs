//! The store operations a copy needs, and their implementation on top of
//! [aws_sdk_s3::Client].

use std::error::Error as StdError;
use std::fmt::Debug;
use std::num::TryFromIntError;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use derive_more::{Display, From, Into};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use super::{PartRange, S3Object};
use crate::types::SdkError;

/// Service error codes which indicate the request may succeed if retried.
const TRANSIENT_ERROR_CODES: &[&str] = &[
    "InternalError",
    "RequestTimeout",
    "ServiceUnavailable",
    "SlowDown",
    "Throttling",
    "ThrottlingException",
];

/// Errors returned by a [StoreTransport].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Missing multipart upload id")]
    MissingUploadId,
    #[error("Missing copy part result")]
    MissingCopyPartResult,
    #[error("Part number out of range: {0}")]
    PartNumber(#[from] TryFromIntError),
    #[error("Transient store error: {0}")]
    Transient(#[source] Box<dyn StdError + Send + Sync>),
    #[error(transparent)]
    Service(Box<dyn StdError + Send + Sync>),
}

impl TransportError {
    /// Whether the failed operation is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Transient(_))
    }
}

impl<E, R> From<SdkError<E, R>> for TransportError
where
    E: StdError + ProvideErrorMetadata + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    fn from(value: SdkError<E, R>) -> Self {
        let transient = match &value {
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
                true
            }
            SdkError::ServiceError(context) => context
                .err()
                .code()
                .is_some_and(|code| TRANSIENT_ERROR_CODES.contains(&code)),
            _ => false,
        };
        if transient {
            Self::Transient(Box::new(value))
        } else {
            Self::Service(Box::new(value))
        }
    }
}

/// Opaque identifier of a multipart write, assigned by the store.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, From, Into)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionToken {
    fn from(value: &str) -> Self {
        SessionToken(value.to_owned())
    }
}

/// Opaque per-part identifier returned by a range copy, e.g. an entity tag.
#[derive(Debug, Display, Clone, PartialEq, Eq, From, Into)]
pub struct IntegrityToken(String);

impl IntegrityToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for IntegrityToken {
    fn from(value: &str) -> Self {
        IntegrityToken(value.to_owned())
    }
}

/// An open multipart write on the destination object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySession {
    pub destination: S3Object,
    pub token: SessionToken,
}

/// A copied part, ready to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartResult {
    pub part_number: u32,
    pub integrity_token: IntegrityToken,
}

/// Metadata reported for one part of an object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartHead {
    /// Number of parts the object was uploaded with. Absent when the object
    /// was not uploaded with a multipart upload.
    pub parts_count: Option<i32>,
    /// The `Content-Range` header for the requested part, in the form
    /// `bytes {start}-{end}/{total}`.
    pub content_range: Option<String>,
}

/// The result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitOutcome {
    pub bucket: String,
    pub key: String,
    pub location: Option<String>,
    pub e_tag: Option<String>,
    pub version_id: Option<String>,
    pub parts: usize,
}

/// The operations on an object store required to copy an object part by part.
///
/// [S3Transport] talks to S3; [crate::s3::memory::MemoryTransport] keeps
/// everything in memory for tests.
#[async_trait]
pub trait StoreTransport: Debug + Send + Sync {
    /// Fetches the metadata of part `part_number` of `source`.
    async fn head_part(
        &self,
        source: &S3Object,
        part_number: u32,
    ) -> Result<PartHead, TransportError>;

    async fn head_first_part(&self, source: &S3Object) -> Result<PartHead, TransportError> {
        self.head_part(source, 1).await
    }

    async fn open_multipart_write(
        &self,
        destination: &S3Object,
    ) -> Result<SessionToken, TransportError>;

    /// Copies `range` of `source` into part `range.part_number` of the session.
    async fn copy_range(
        &self,
        session: &CopySession,
        source: &S3Object,
        range: &PartRange,
    ) -> Result<IntegrityToken, TransportError>;

    /// Assembles the destination from `parts`, which must be sorted by part number.
    async fn commit_multipart_write(
        &self,
        session: &CopySession,
        parts: &[PartResult],
    ) -> Result<CommitOutcome, TransportError>;

    async fn abort_multipart_write(&self, session: &CopySession) -> Result<(), TransportError>;
}

/// A [StoreTransport] backed by an S3 [Client].
///
/// ```no_run
/// use s3_part_copy::config::{load_from_env, s3_client};
/// use s3_part_copy::s3::S3Transport;
///
/// # tokio_test::block_on(async {
/// let shared_config = load_from_env(None).await.unwrap();
/// let transport = S3Transport::new(s3_client(&shared_config));
/// # })
/// ```
#[derive(Debug, Clone)]
pub struct S3Transport {
    client: Arc<Client>,
}

impl S3Transport {
    pub fn new(client: impl Into<Arc<Client>>) -> Self {
        S3Transport {
            client: client.into(),
        }
    }
}

#[async_trait]
impl StoreTransport for S3Transport {
    #[instrument(skip(self))]
    async fn head_part(
        &self,
        source: &S3Object,
        part_number: u32,
    ) -> Result<PartHead, TransportError> {
        let head_object = self
            .client
            .head_object()
            .bucket(&source.bucket)
            .key(&source.key)
            .part_number(i32::try_from(part_number)?)
            .send()
            .await?;

        Ok(PartHead {
            parts_count: head_object.parts_count(),
            content_range: head_object.content_range().map(str::to_owned),
        })
    }

    #[instrument(skip(self))]
    async fn open_multipart_write(
        &self,
        destination: &S3Object,
    ) -> Result<SessionToken, TransportError> {
        let create_multipart_upload = self
            .client
            .create_multipart_upload()
            .bucket(&destination.bucket)
            .key(&destination.key)
            .send()
            .await?;

        create_multipart_upload
            .upload_id()
            .map(SessionToken::from)
            .ok_or(TransportError::MissingUploadId)
    }

    #[instrument(skip(self, session), fields(upload_id = %session.token))]
    async fn copy_range(
        &self,
        session: &CopySession,
        source: &S3Object,
        range: &PartRange,
    ) -> Result<IntegrityToken, TransportError> {
        let response = self
            .client
            .upload_part_copy()
            .bucket(&session.destination.bucket)
            .key(&session.destination.key)
            .upload_id(session.token.as_str())
            .part_number(i32::try_from(range.part_number)?)
            .copy_source(source.copy_source())
            .copy_source_range(range.copy_source_range())
            .send()
            .await?;

        response
            .copy_part_result
            .and_then(|result| result.e_tag)
            .map(IntegrityToken::from)
            .ok_or(TransportError::MissingCopyPartResult)
    }

    #[instrument(skip(self, session, parts), fields(upload_id = %session.token, parts = parts.len()))]
    async fn commit_multipart_write(
        &self,
        session: &CopySession,
        parts: &[PartResult],
    ) -> Result<CommitOutcome, TransportError> {
        let completed_parts = parts
            .iter()
            .map(|part| {
                Ok(CompletedPart::builder()
                    .e_tag(part.integrity_token.as_str())
                    .part_number(i32::try_from(part.part_number)?)
                    .build())
            })
            .collect::<Result<Vec<_>, TransportError>>()?;
        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        let response = self
            .client
            .complete_multipart_upload()
            .bucket(&session.destination.bucket)
            .key(&session.destination.key)
            .upload_id(session.token.as_str())
            .multipart_upload(completed_multipart_upload)
            .send()
            .await?;

        Ok(CommitOutcome {
            bucket: response
                .bucket()
                .unwrap_or(&session.destination.bucket)
                .to_owned(),
            key: response.key().unwrap_or(&session.destination.key).to_owned(),
            location: response.location().map(str::to_owned),
            e_tag: response.e_tag().map(str::to_owned),
            version_id: response.version_id().map(str::to_owned),
            parts: parts.len(),
        })
    }

    #[instrument(skip(self, session), fields(upload_id = %session.token))]
    async fn abort_multipart_write(&self, session: &CopySession) -> Result<(), TransportError> {
        self.client
            .abort_multipart_upload()
            .bucket(&session.destination.bucket)
            .key(&session.destination.key)
            .upload_id(session.token.as_str())
            .send()
            .await?;
        Ok(())
    }
}
