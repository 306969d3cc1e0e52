//! Copying multipart S3 objects part by part.
//!
//! A copy is built from three pieces:
//!
//! * [PartPlan] turns the [SourceLayout] of a source object into the byte
//!   ranges of its parts.
//! * [PartCopyExecutor] copies those ranges into an open multipart upload
//!   with bounded concurrency, retrying transient failures.
//! * [S3PartCopier] inspects the source, opens the upload, runs the executor
//!   and either commits the result or aborts the upload.
//!
//! All store access goes through the [StoreTransport] trait. [S3Transport]
//! implements it on top of [Client].

/// Re-export of [aws_sdk_s3::client::Client](https://docs.rs/aws-sdk-s3/latest/aws_sdk_s3/client/struct.Client.html).
///
pub use aws_sdk_s3::Client;

mod content_range;
mod copier;
mod executor;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
mod plan;
mod retry;
mod s3_object;
mod transport;

pub use content_range::{ContentRange, ContentRangeError};
pub use copier::{
    CopyError, CopyRequest, CopyStage, CopyStrategy, MetadataError, S3PartCopier,
};
pub use executor::{
    CopyProgress, LogProgress, NoProgress, PartCopyError, PartCopyExecutor,
    DEFAULT_MAX_CONCURRENT_COPIES,
};
pub use plan::{
    LayoutError, PartPlan, PartRange, PartRanges, SourceLayout, MAX_PART_COUNT, MAX_SOURCE_SIZE,
};
pub use retry::RetryPolicy;
pub use s3_object::{S3Object, S3ObjectError};
pub use transport::{
    CommitOutcome, CopySession, IntegrityToken, PartHead, PartResult, S3Transport, SessionToken,
    StoreTransport, TransportError,
};

#[cfg(test)]
pub(crate) mod test {
    use crate::config::{load_from_env, s3_client};
    use crate::endpoint;
    use crate::s3::S3Object;
    use anyhow::{Context, Result};
    use aws_sdk_s3::primitives::ByteStream;
    use aws_sdk_s3::types::{
        BucketLocationConstraint, CompletedMultipartUpload, CompletedPart,
        CreateBucketConfiguration,
    };
    use aws_sdk_s3::Client;
    use rand::distributions::{Alphanumeric, DistString};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    use crate::types::SdkError;

    pub async fn localstack_test_client() -> Client {
        endpoint::test_utils::wait_for_localstack().await;
        let shared_config = load_from_env(None).await.unwrap();
        s3_client(&shared_config)
    }

    pub async fn create_bucket(client: &Client, bucket: &str) -> Result<()> {
        let constraint = CreateBucketConfiguration::builder()
            .location_constraint(BucketLocationConstraint::ApSoutheast2)
            .build();
        match client
            .create_bucket()
            .bucket(bucket)
            .create_bucket_configuration(constraint)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(ref context))
                if context.err().is_bucket_already_owned_by_you() =>
            {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Uploads `parts` as the parts of a multipart upload to `obj`.
    pub async fn put_parts(client: &Client, obj: &S3Object, parts: &[Vec<u8>]) -> Result<()> {
        let upload = client
            .create_multipart_upload()
            .bucket(&obj.bucket)
            .key(&obj.key)
            .send()
            .await?;
        let upload_id = upload.upload_id().context("Missing upload id")?;

        let mut completed_parts = Vec::with_capacity(parts.len());
        for (index, part) in parts.iter().enumerate() {
            let part_number = i32::try_from(index + 1)?;
            let response = client
                .upload_part()
                .bucket(&obj.bucket)
                .key(&obj.key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(part.clone()))
                .send()
                .await?;
            completed_parts.push(
                CompletedPart::builder()
                    .set_e_tag(response.e_tag)
                    .part_number(part_number)
                    .build(),
            );
        }

        client
            .complete_multipart_upload()
            .bucket(&obj.bucket)
            .key(&obj.key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .send()
            .await?;
        Ok(())
    }

    pub fn seeded_rng<H: Hash + ?Sized>(seed: &H) -> impl Rng {
        let mut hasher = DefaultHasher::new();
        seed.hash(&mut hasher);
        ChaCha8Rng::seed_from_u64(hasher.finish())
    }

    pub fn gen_random_file_name<R: Rng>(rng: &mut R) -> String {
        Alphanumeric.sample_string(rng, 16)
    }

    pub fn generate_random_bytes(length: usize, rng: &mut impl Rng) -> Vec<u8> {
        (0..length).map(|_| rng.gen()).collect()
    }

    pub async fn fetch_bytes(client: &Client, obj: &S3Object) -> Result<Vec<u8>> {
        Ok(client
            .get_object()
            .bucket(&obj.bucket)
            .key(&obj.key)
            .send()
            .await?
            .body
            .collect()
            .await?
            .into_bytes()
            .to_vec())
    }
}
