use std::fmt;
use std::str::FromStr;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Bytes of a key escaped in a copy source. Unreserved characters and the
/// `/` separator are sent as is.
const COPY_SOURCE_KEY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Errors raised when converting a URL into an [S3Object].
#[derive(Debug, Error)]
pub enum S3ObjectError {
    #[error("S3 URL must have a scheme of s3, found {0}")]
    Scheme(String),
    #[error("S3 URL must have a host")]
    MissingBucket,
    #[error("S3 URL must have a path")]
    MissingKey,
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// A bucket key pair locating an object in S3, with conversion from S3 urls.
///
/// Both the source and the destination of a copy are described by an [S3Object].
#[derive(Debug, PartialEq, Eq, Hash, Clone, Serialize, Deserialize)]
pub struct S3Object {
    /// The bucket the object is in.
    pub bucket: String,
    /// The key in the bucket for the object.
    pub key: String,
}

impl S3Object {
    /// Create a new [S3Object] using anything which can be
    /// treated as [&str].  Any leading `/` will be trimmed from
    /// the key.  No validation is done against the bucket or key
    /// to ensure they meet the AWS requirements.
    pub fn new(bucket: impl AsRef<str>, key: impl AsRef<str>) -> Self {
        S3Object {
            bucket: bucket.as_ref().to_owned(),
            key: key.as_ref().trim_start_matches('/').to_owned(),
        }
    }

    /// The value of the `x-amz-copy-source` header when this object
    /// is the source of an `UploadPartCopy`. The key is URL encoded.
    pub fn copy_source(&self) -> String {
        format!(
            "{}/{}",
            self.bucket,
            utf8_percent_encode(&self.key, COPY_SOURCE_KEY)
        )
    }
}

impl fmt::Display for S3Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Convert from an [Url] into a [S3Object]. The scheme
/// must be `s3` and the `path` must not be empty.
impl TryFrom<Url> for S3Object {
    type Error = S3ObjectError;

    fn try_from(value: Url) -> Result<Self, Self::Error> {
        if value.scheme() != "s3" {
            return Err(S3ObjectError::Scheme(value.scheme().to_owned()));
        }
        let bucket = value.host_str().ok_or(S3ObjectError::MissingBucket)?;
        let key = value.path().trim_start_matches('/');
        if key.is_empty() {
            return Err(S3ObjectError::MissingKey);
        }
        Ok(S3Object::new(bucket, key))
    }
}

impl FromStr for S3Object {
    type Err = S3ObjectError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.parse::<Url>()?.try_into()
    }
}

impl TryFrom<&S3Object> for Url {
    type Error = url::ParseError;

    fn try_from(obj: &S3Object) -> Result<Self, Self::Error> {
        Url::parse(&obj.to_string())
    }
}
