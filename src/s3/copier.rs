use std::num::TryFromIntError;
use std::sync::Arc;

use derive_more::Display;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use typed_builder::TypedBuilder;

use super::executor::DEFAULT_MAX_CONCURRENT_COPIES;
use super::{
    CommitOutcome, ContentRange, ContentRangeError, CopyProgress, CopySession, LayoutError,
    NoProgress, PartCopyError, PartCopyExecutor, PartPlan, PartResult, RetryPolicy, S3Object,
    SourceLayout, StoreTransport, TransportError,
};

/// The source and destination of a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    pub source: S3Object,
    pub destination: S3Object,
}

impl CopyRequest {
    pub fn new(source: S3Object, destination: S3Object) -> Self {
        CopyRequest {
            source,
            destination,
        }
    }
}

/// How a source object will be copied, decided from its metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStrategy {
    /// The source was not uploaded in multiple parts. Holds the reported
    /// parts count, if any.
    SingleCopy { parts_count: Option<i32> },
    /// The source was uploaded in parts with the given layout.
    MultiPartCopy(SourceLayout),
}

/// Errors in the metadata reported for a source object.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Missing content range for part {0}")]
    MissingContentRange(u32),
    #[error(transparent)]
    ContentRange(#[from] ContentRangeError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error("Part 1 starts at byte {0}, expected 0")]
    FirstPartOffset(u64),
    #[error("Invalid parts count: {0}")]
    PartsCount(#[from] TryFromIntError),
    #[error("Part {part_number} is reported as {actual}, expected {expected}. Source parts are not uniformly sized")]
    NonUniformParts {
        part_number: u32,
        expected: ContentRange,
        actual: ContentRange,
    },
}

/// The stage of a copy in which an error occurred.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum CopyStage {
    #[display("metadata inspection")]
    Inspection,
    #[display("session open")]
    SessionOpen,
    #[display("part copy")]
    PartCopy,
    #[display("commit")]
    Commit,
}

/// Errors returned by [S3PartCopier::copy_object].
#[derive(Debug, Error)]
pub enum CopyError {
    #[error("metadata inspection: {object} was not uploaded in multiple parts (parts count {parts_count:?}), single part copy is not implemented")]
    UnsupportedLayout {
        object: S3Object,
        parts_count: Option<i32>,
    },
    #[error("metadata inspection: failed to inspect {object}: {source}")]
    Inspect {
        object: S3Object,
        #[source]
        source: TransportError,
    },
    #[error("metadata inspection: malformed metadata for {object}: {source}")]
    MalformedMetadata {
        object: S3Object,
        #[source]
        source: MetadataError,
    },
    #[error("session open: failed to start multipart upload to {destination}: {source}")]
    SessionOpen {
        destination: S3Object,
        #[source]
        source: TransportError,
    },
    #[error("session open: copy was cancelled before the multipart upload to {destination} was started")]
    Cancelled { destination: S3Object },
    #[error("part copy: {0}")]
    PartCopy(#[from] PartCopyError),
    #[error("commit: parts are not numbered 1..={expected}, found part {found} at position {position}")]
    PartOrdering {
        expected: usize,
        position: usize,
        found: u32,
    },
    #[error("commit: failed to complete multipart upload to {destination}: {source}")]
    Commit {
        destination: S3Object,
        #[source]
        source: TransportError,
    },
}

impl CopyError {
    pub fn stage(&self) -> CopyStage {
        match self {
            CopyError::UnsupportedLayout { .. }
            | CopyError::Inspect { .. }
            | CopyError::MalformedMetadata { .. } => CopyStage::Inspection,
            CopyError::SessionOpen { .. } | CopyError::Cancelled { .. } => CopyStage::SessionOpen,
            CopyError::PartCopy(_) => CopyStage::PartCopy,
            CopyError::PartOrdering { .. } | CopyError::Commit { .. } => CopyStage::Commit,
        }
    }
}

/// Copies a multipart S3 object, reproducing the part layout of the source.
///
/// The layout is inferred from part 1 of the source: its size is assumed to
/// be the size of every part except the last. Unless `verify_layout` is
/// disabled, the last part is inspected as well and the copy is refused if
/// it does not match the inferred layout.
///
/// Each part is copied with an `UploadPartCopy` request, with at most
/// `max_concurrent_copies` requests in flight. The multipart upload is
/// aborted if any part fails, if the commit fails, or if `cancellation`
/// is triggered.
///
/// Objects which were not uploaded in multiple parts are rejected with
/// [CopyError::UnsupportedLayout].
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use s3_part_copy::config::{load_from_env, s3_client};
/// use s3_part_copy::s3::{CopyRequest, S3Object, S3PartCopier, S3Transport};
///
/// # tokio_test::block_on(async {
/// let shared_config = load_from_env(None).await.unwrap();
/// let copier = S3PartCopier::builder()
///     .transport(Arc::new(S3Transport::new(s3_client(&shared_config))))
///     .max_concurrent_copies(16)
///     .build();
///
/// let request = CopyRequest::new(
///     S3Object::new("source-bucket", "source-key"),
///     S3Object::new("destination-bucket", "destination-key"),
/// );
/// let outcome = copier.copy_object(&request).await.unwrap();
/// println!("{outcome:?}");
/// # })
/// ```
#[derive(Debug, TypedBuilder)]
pub struct S3PartCopier {
    transport: Arc<dyn StoreTransport>,
    #[builder(default = DEFAULT_MAX_CONCURRENT_COPIES)]
    max_concurrent_copies: usize,
    #[builder(default)]
    retry: RetryPolicy,
    #[builder(default = true)]
    verify_layout: bool,
    #[builder(default = Arc::new(NoProgress) as Arc<dyn CopyProgress>)]
    progress: Arc<dyn CopyProgress>,
    #[builder(default)]
    cancellation: CancellationToken,
}

impl S3PartCopier {
    /// Decides how `source` can be copied from the metadata of its first part.
    #[instrument(skip(self))]
    pub async fn inspect(&self, source: &S3Object) -> Result<CopyStrategy, CopyError> {
        let head = self
            .transport
            .head_first_part(source)
            .await
            .map_err(|source_err| CopyError::Inspect {
                object: source.clone(),
                source: source_err,
            })?;

        let parts_count = match head.parts_count {
            Some(count) if count > 1 => count,
            parts_count => return Ok(CopyStrategy::SingleCopy { parts_count }),
        };

        Self::derive_layout(parts_count, head.content_range.as_deref())
            .map(CopyStrategy::MultiPartCopy)
            .map_err(|e| CopyError::MalformedMetadata {
                object: source.clone(),
                source: e,
            })
    }

    fn derive_layout(
        parts_count: i32,
        content_range: Option<&str>,
    ) -> Result<SourceLayout, MetadataError> {
        let first_part: ContentRange = content_range
            .ok_or(MetadataError::MissingContentRange(1))?
            .parse()?;
        if first_part.start() != 0 {
            return Err(MetadataError::FirstPartOffset(first_part.start()));
        }
        let layout = SourceLayout::new(
            first_part.total(),
            u32::try_from(parts_count)?,
            first_part.len(),
        )?;
        Ok(layout)
    }

    /// Checks that the last part of the source matches the last range of `plan`.
    #[instrument(skip(self, plan))]
    async fn verify_last_part(&self, source: &S3Object, plan: &PartPlan) -> Result<(), CopyError> {
        let malformed = |e: MetadataError| CopyError::MalformedMetadata {
            object: source.clone(),
            source: e,
        };
        let part_count = plan.layout().part_count();
        let head = self
            .transport
            .head_part(source, part_count)
            .await
            .map_err(|source_err| CopyError::Inspect {
                object: source.clone(),
                source: source_err,
            })?;

        let actual: ContentRange = head
            .content_range
            .as_deref()
            .ok_or(MetadataError::MissingContentRange(part_count))
            .and_then(|header| Ok(header.parse::<ContentRange>()?))
            .map_err(malformed)?;
        let expected = plan
            .last()
            .map(|range| ContentRange::new(range.start, range.end, plan.layout().total_size()))
            .transpose()
            .map_err(|e| malformed(e.into()))?;

        match expected {
            Some(expected) if expected == actual => Ok(()),
            Some(expected) => Err(malformed(MetadataError::NonUniformParts {
                part_number: part_count,
                expected,
                actual,
            })),
            None => Err(malformed(LayoutError::ZeroPartCount.into())),
        }
    }

    /// Copies `request.source` to `request.destination`.
    ///
    /// Resolves once the destination has been committed, or with the error
    /// of the stage which failed.
    #[instrument(skip(self), fields(source = %request.source, destination = %request.destination))]
    pub async fn copy_object(&self, request: &CopyRequest) -> Result<CommitOutcome, CopyError> {
        tracing::info!("Starting multipart copy");

        let layout = match self.inspect(&request.source).await? {
            CopyStrategy::SingleCopy { parts_count } => {
                tracing::info!(?parts_count, "Source was not uploaded in multiple parts");
                return Err(CopyError::UnsupportedLayout {
                    object: request.source.clone(),
                    parts_count,
                });
            }
            CopyStrategy::MultiPartCopy(layout) => layout,
        };
        tracing::info!(
            total_size = layout.total_size(),
            part_count = layout.part_count(),
            part_size = layout.part_size(),
            "Source is a multipart object"
        );

        let plan = PartPlan::new(layout);
        if self.verify_layout {
            self.verify_last_part(&request.source, &plan).await?;
        }

        if self.cancellation.is_cancelled() {
            tracing::warn!("Copy cancelled before the multipart upload was started");
            return Err(CopyError::Cancelled {
                destination: request.destination.clone(),
            });
        }

        let token = self
            .transport
            .open_multipart_write(&request.destination)
            .await
            .map_err(|source| CopyError::SessionOpen {
                destination: request.destination.clone(),
                source,
            })?;
        let session = CopySession {
            destination: request.destination.clone(),
            token,
        };
        tracing::info!(upload_id = %session.token, "Multipart upload started");

        match self.copy_and_commit(&session, &request.source, &plan).await {
            Ok(outcome) => {
                tracing::info!(e_tag = ?outcome.e_tag, "MultipartCopy completed");
                Ok(outcome)
            }
            Err(e) => {
                self.abort(&session).await;
                Err(e)
            }
        }
    }

    async fn copy_and_commit(
        &self,
        session: &CopySession,
        source: &S3Object,
        plan: &PartPlan,
    ) -> Result<CommitOutcome, CopyError> {
        let parts = PartCopyExecutor::builder()
            .transport(self.transport.as_ref())
            .max_concurrent_copies(self.max_concurrent_copies)
            .retry(&self.retry)
            .progress(self.progress.as_ref())
            .cancellation(&self.cancellation)
            .build()
            .execute(session, source, plan)
            .await?;

        check_part_order(&parts, plan.len())?;

        self.transport
            .commit_multipart_write(session, &parts)
            .await
            .map_err(|source| CopyError::Commit {
                destination: session.destination.clone(),
                source,
            })
    }

    async fn abort(&self, session: &CopySession) {
        tracing::warn!(upload_id = %session.token, "Aborting multipart upload");
        if let Err(e) = self.transport.abort_multipart_write(session).await {
            tracing::error!(
                upload_id = %session.token,
                error = %e,
                "Failed to abort multipart upload"
            );
        }
    }
}

/// Checks that `parts` are numbered exactly `1..=expected`, in order.
fn check_part_order(parts: &[PartResult], expected: usize) -> Result<(), CopyError> {
    for (position, part) in parts.iter().enumerate() {
        if part.part_number as usize != position + 1 {
            return Err(CopyError::PartOrdering {
                expected,
                position,
                found: part.part_number,
            });
        }
    }
    if parts.len() != expected {
        return Err(CopyError::PartOrdering {
            expected,
            position: parts.len(),
            found: 0,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::memory::{InjectedFailure, MemoryTransport, TransportEvent};
    use crate::s3::IntegrityToken;
    use assert_matches::assert_matches;
    use bytes::Bytes;
    use proptest::prop_assert_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::time::Duration;
    use test_strategy::proptest;

    fn request() -> CopyRequest {
        CopyRequest::new(
            S3Object::new("source-bucket", "big/object.bin"),
            S3Object::new("destination-bucket", "copy/object.bin"),
        )
    }

    fn random_bytes(length: usize, seed: u64) -> Bytes {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..length).map(|_| rng.gen::<u8>()).collect::<Vec<_>>().into()
    }

    fn copier(transport: &Arc<MemoryTransport>) -> S3PartCopier {
        S3PartCopier::builder()
            .transport(transport.clone() as Arc<dyn StoreTransport>)
            .max_concurrent_copies(8)
            .retry(
                RetryPolicy::builder()
                    .initial_backoff(Duration::from_millis(1))
                    .build(),
            )
            .build()
    }

    fn session_opened(transport: &MemoryTransport) -> bool {
        transport
            .events()
            .iter()
            .any(|event| matches!(event, TransportEvent::SessionOpened { .. }))
    }

    #[tokio::test]
    async fn copies_multipart_object() {
        let transport = Arc::new(MemoryTransport::new());
        let data = random_bytes(1000, 1);
        transport.put_multipart(&request().source, data.clone(), 64);

        let outcome = copier(&transport).copy_object(&request()).await.unwrap();

        assert_eq!(outcome.parts, 16);
        assert_eq!(outcome.bucket, "destination-bucket");
        assert_eq!(outcome.key, "copy/object.bin");
        assert_eq!(transport.object(&request().destination), Some(data));
        assert_eq!(transport.open_writes(), 0);

        let committed = transport.events().into_iter().find_map(|event| match event {
            TransportEvent::Committed { part_numbers, .. } => Some(part_numbers),
            _ => None,
        });
        assert_eq!(committed, Some((1..=16).collect()));
    }

    #[tokio::test]
    async fn copy_reproduces_source_part_layout() {
        let transport = Arc::new(MemoryTransport::new());
        transport.put_multipart(&request().source, random_bytes(250, 2), 100);

        copier(&transport).copy_object(&request()).await.unwrap();

        let expected_ranges = [
            (1, "bytes 0-99/250"),
            (2, "bytes 100-199/250"),
            (3, "bytes 200-249/250"),
        ];
        for (part_number, expected) in expected_ranges {
            let head = transport
                .head_part(&request().destination, part_number)
                .await
                .unwrap();
            assert_eq!(head.parts_count, Some(3));
            assert_eq!(head.content_range.as_deref(), Some(expected));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn commit_is_ordered_when_parts_finish_out_of_order() {
        let transport = Arc::new(MemoryTransport::new());
        transport.put_multipart(&request().source, random_bytes(40, 3), 4);
        transport.set_copy_latency(|part_number| {
            Duration::from_millis(u64::from(11 - part_number) * 3)
        });

        copier(&transport).copy_object(&request()).await.unwrap();

        let committed = transport.events().into_iter().find_map(|event| match event {
            TransportEvent::Committed { part_numbers, .. } => Some(part_numbers),
            _ => None,
        });
        assert_eq!(committed, Some((1..=10).collect()));
    }

    #[tokio::test]
    async fn single_part_source_is_unsupported() {
        let transport = Arc::new(MemoryTransport::new());
        transport.put_multipart(&request().source, random_bytes(10, 4), 100);

        let err = copier(&transport).copy_object(&request()).await.unwrap_err();

        assert_matches!(
            err,
            CopyError::UnsupportedLayout {
                parts_count: Some(1),
                ..
            }
        );
        assert_eq!(err.stage(), CopyStage::Inspection);
        assert!(!session_opened(&transport));
    }

    #[tokio::test]
    async fn source_without_parts_count_is_unsupported() {
        let transport = Arc::new(MemoryTransport::new());
        transport.put_object(&request().source, random_bytes(10, 5));
        // The header is never looked at for a single part source.
        transport.override_content_range(&request().source, 1, "garbage");

        let err = copier(&transport).copy_object(&request()).await.unwrap_err();

        assert_matches!(
            err,
            CopyError::UnsupportedLayout {
                parts_count: None,
                ..
            }
        );
        assert!(!session_opened(&transport));
        assert_eq!(transport.object(&request().destination), None);
    }

    #[tokio::test]
    async fn missing_source_fails_inspection() {
        let transport = Arc::new(MemoryTransport::new());

        let err = copier(&transport).copy_object(&request()).await.unwrap_err();

        assert_matches!(err, CopyError::Inspect { .. });
        assert_eq!(err.stage(), CopyStage::Inspection);
    }

    #[tokio::test]
    async fn malformed_content_range_is_rejected() {
        let transport = Arc::new(MemoryTransport::new());
        transport.put_multipart(&request().source, random_bytes(20, 6), 8);
        transport.override_content_range(&request().source, 1, "bytes 10-5/20");

        let err = copier(&transport).copy_object(&request()).await.unwrap_err();

        assert_matches!(
            err,
            CopyError::MalformedMetadata {
                source: MetadataError::ContentRange(ContentRangeError::StartAfterEnd { start: 10, end: 5 }),
                ..
            }
        );
        assert!(!session_opened(&transport));
    }

    #[tokio::test]
    async fn first_part_must_start_at_zero() {
        let transport = Arc::new(MemoryTransport::new());
        transport.put_multipart(&request().source, random_bytes(25, 19), 10);
        transport.override_content_range(&request().source, 1, "bytes 5-14/25");

        let err = copier(&transport).copy_object(&request()).await.unwrap_err();

        assert_matches!(
            err,
            CopyError::MalformedMetadata {
                source: MetadataError::FirstPartOffset(5),
                ..
            }
        );
        assert!(!session_opened(&transport));
    }

    #[test]
    fn layout_is_not_derived_from_offset_first_part() {
        assert_matches!(
            S3PartCopier::derive_layout(3, Some("bytes 5-14/25")),
            Err(MetadataError::FirstPartOffset(5))
        );
        assert_matches!(
            S3PartCopier::derive_layout(3, None),
            Err(MetadataError::MissingContentRange(1))
        );
    }

    #[tokio::test]
    async fn inconsistent_layout_is_rejected() {
        let transport = Arc::new(MemoryTransport::new());
        transport.put_multipart(&request().source, random_bytes(20, 7), 8);
        // 3 parts of 2 bytes can not make up 20 bytes.
        transport.override_content_range(&request().source, 1, "bytes 0-1/20");

        let err = copier(&transport).copy_object(&request()).await.unwrap_err();

        assert_matches!(
            err,
            CopyError::MalformedMetadata {
                source: MetadataError::Layout(LayoutError::Inconsistent { .. }),
                ..
            }
        );
    }

    #[tokio::test]
    async fn non_uniform_parts_are_detected() {
        let transport = Arc::new(MemoryTransport::new());
        // Parts of 10, 10, 12 and 5 bytes: part 1 suggests a final part at 30..37.
        transport.put_parts(
            &request().source,
            vec![
                random_bytes(10, 8),
                random_bytes(10, 9),
                random_bytes(12, 10),
                random_bytes(5, 11),
            ],
        );

        let err = copier(&transport).copy_object(&request()).await.unwrap_err();

        assert_matches!(
            err,
            CopyError::MalformedMetadata {
                source: MetadataError::NonUniformParts { part_number: 4, .. },
                ..
            }
        );
        assert!(!session_opened(&transport));
    }

    #[tokio::test]
    async fn verification_can_be_disabled() {
        let transport = Arc::new(MemoryTransport::new());
        transport.put_multipart(&request().source, random_bytes(30, 12), 10);

        let copier = S3PartCopier::builder()
            .transport(transport.clone() as Arc<dyn StoreTransport>)
            .verify_layout(false)
            .build();
        copier.copy_object(&request()).await.unwrap();

        let heads = transport
            .events()
            .into_iter()
            .filter(|event| matches!(event, TransportEvent::PartHeaded { .. }))
            .count();
        assert_eq!(heads, 1);
    }

    #[tokio::test]
    async fn part_failure_aborts_the_session() {
        let transport = Arc::new(MemoryTransport::new());
        transport.put_multipart(&request().source, random_bytes(100, 13), 10);
        transport.fail_part(7, InjectedFailure::Fatal, 1);

        let err = copier(&transport).copy_object(&request()).await.unwrap_err();

        assert_matches!(
            err,
            CopyError::PartCopy(PartCopyError::Failed { part_number: 7, .. })
        );
        assert_eq!(err.stage(), CopyStage::PartCopy);
        assert!(err.to_string().starts_with("part copy"));
        assert_eq!(transport.open_writes(), 0);
        assert!(transport
            .events()
            .iter()
            .any(|event| matches!(event, TransportEvent::Aborted { .. })));
        assert_eq!(transport.object(&request().destination), None);
    }

    #[tokio::test]
    async fn transient_part_failures_are_retried() {
        let transport = Arc::new(MemoryTransport::new());
        let data = random_bytes(100, 14);
        transport.put_multipart(&request().source, data.clone(), 10);
        transport.fail_part(3, InjectedFailure::Transient, 2);

        copier(&transport).copy_object(&request()).await.unwrap();

        assert_eq!(transport.object(&request().destination), Some(data));
    }

    #[tokio::test]
    async fn commit_failure_aborts_the_session() {
        let transport = Arc::new(MemoryTransport::new());
        transport.put_multipart(&request().source, random_bytes(30, 15), 10);
        transport.fail_commit(InjectedFailure::Fatal);

        let err = copier(&transport).copy_object(&request()).await.unwrap_err();

        assert_matches!(err, CopyError::Commit { .. });
        assert_eq!(err.stage(), CopyStage::Commit);
        assert_eq!(transport.open_writes(), 0);
    }

    #[tokio::test]
    async fn failed_abort_keeps_original_error() {
        let transport = Arc::new(MemoryTransport::new());
        transport.put_multipart(&request().source, random_bytes(30, 16), 10);
        transport.fail_commit(InjectedFailure::Fatal);
        transport.fail_abort();

        let err = copier(&transport).copy_object(&request()).await.unwrap_err();

        assert_matches!(err, CopyError::Commit { .. });
        assert_eq!(transport.open_writes(), 1);
    }

    #[tokio::test]
    async fn cancellation_before_open_starts_no_upload() {
        let transport = Arc::new(MemoryTransport::new());
        transport.put_multipart(&request().source, random_bytes(30, 17), 10);
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let copier = S3PartCopier::builder()
            .transport(transport.clone() as Arc<dyn StoreTransport>)
            .cancellation(cancellation)
            .build();
        let err = copier.copy_object(&request()).await.unwrap_err();

        assert_matches!(err, CopyError::Cancelled { .. });
        assert_eq!(err.stage(), CopyStage::SessionOpen);
        assert!(!session_opened(&transport));
        assert_eq!(transport.open_writes(), 0);
    }

    /// Cancels the copy as soon as the first part has been copied.
    #[derive(Debug)]
    struct CancelAfterFirstPart(CancellationToken);

    impl CopyProgress for CancelAfterFirstPart {
        fn part_completed(&self, _completed: usize, _total: usize) {
            self.0.cancel();
        }
    }

    #[tokio::test]
    async fn cancellation_during_copy_aborts_the_session() {
        let transport = Arc::new(MemoryTransport::new());
        transport.put_multipart(&request().source, random_bytes(30, 18), 10);
        let cancellation = CancellationToken::new();

        let copier = S3PartCopier::builder()
            .transport(transport.clone() as Arc<dyn StoreTransport>)
            .max_concurrent_copies(1)
            .progress(Arc::new(CancelAfterFirstPart(cancellation.clone())))
            .cancellation(cancellation)
            .build();
        let err = copier.copy_object(&request()).await.unwrap_err();

        assert_matches!(err, CopyError::PartCopy(PartCopyError::Cancelled { .. }));
        assert!(session_opened(&transport));
        assert!(transport
            .events()
            .iter()
            .any(|event| matches!(event, TransportEvent::Aborted { .. })));
        assert_eq!(transport.open_writes(), 0);
        assert_eq!(transport.object(&request().destination), None);
    }

    #[test]
    fn part_order_check() {
        let part = |part_number| PartResult {
            part_number,
            integrity_token: IntegrityToken::from("\"etag\""),
        };
        assert!(check_part_order(&[part(1), part(2), part(3)], 3).is_ok());
        assert_matches!(
            check_part_order(&[part(1), part(3)], 3),
            Err(CopyError::PartOrdering { position: 1, found: 3, .. })
        );
        assert_matches!(
            check_part_order(&[part(1), part(1)], 2),
            Err(CopyError::PartOrdering { position: 1, found: 1, .. })
        );
        assert_matches!(
            check_part_order(&[part(1), part(2)], 3),
            Err(CopyError::PartOrdering { position: 2, .. })
        );
    }

    #[proptest(cases = 32)]
    fn layout_is_derived_from_first_part(
        #[strategy(2_i32..=200)] parts_count: i32,
        #[strategy(1_u64..=1_000_000)] part_size: u64,
        #[strategy(1_u64..=#part_size)] last_part: u64,
    ) {
        let total = part_size * (parts_count as u64 - 1) + last_part;
        let header = format!("bytes 0-{}/{total}", part_size - 1);

        let layout = S3PartCopier::derive_layout(parts_count, Some(&header))?;
        prop_assert_eq!(layout.total_size(), total);
        prop_assert_eq!(layout.part_count(), parts_count as u32);
        prop_assert_eq!(layout.part_size(), part_size);
    }
}
