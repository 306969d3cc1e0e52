//! Parsing of the `Content-Range` header returned by `HeadObject` when it is
//! called with a `PartNumber`.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use thiserror::Error;

/// Errors that can occur when parsing a [ContentRange].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContentRangeError {
    #[error("Content range {0:?} is not of the form \"bytes <start>-<end>/<total>\"")]
    Malformed(String),
    #[error("Content range {input:?} contains an invalid number: {source}")]
    InvalidNumber {
        input: String,
        #[source]
        source: ParseIntError,
    },
    #[error("The start byte must be less than or equal to the end byte \n start: {start}, end: {end}")]
    StartAfterEnd { start: u64, end: u64 },
    #[error("The end byte must be less than or equal to the total \n end: {end}, total: {total}")]
    EndAfterTotal { end: u64, total: u64 },
}

/// A parsed `bytes {start}-{end}/{total}` descriptor.
///
/// `start` and `end` are inclusive byte offsets. Parsing guarantees
/// `start <= end <= total`.
///
/// ```
/// use s3_part_copy::s3::ContentRange;
///
/// let range: ContentRange = "bytes 0-8388607/20277918669".parse().unwrap();
/// assert_eq!((range.start(), range.end(), range.total()), (0, 8388607, 20277918669));
/// assert_eq!(range.len(), 8388608);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    start: u64,
    end: u64,
    total: u64,
}

impl ContentRange {
    pub fn new(start: u64, end: u64, total: u64) -> Result<Self, ContentRangeError> {
        if start > end {
            Err(ContentRangeError::StartAfterEnd { start, end })
        } else if end > total {
            Err(ContentRangeError::EndAfterTotal { end, total })
        } else {
            Ok(ContentRange { start, end, total })
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of bytes covered by the range.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }
}

fn parse_number(field: &str, input: &str) -> Result<u64, ContentRangeError> {
    // `u64::from_str` tolerates a leading `+`, the header never carries one.
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ContentRangeError::Malformed(input.to_owned()));
    }
    field
        .parse()
        .map_err(|source| ContentRangeError::InvalidNumber {
            input: input.to_owned(),
            source,
        })
}

impl FromStr for ContentRange {
    type Err = ContentRangeError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let malformed = || ContentRangeError::Malformed(input.to_owned());

        let range_total = input.strip_prefix("bytes ").ok_or_else(malformed)?;
        let (range, total) = range_total.split_once('/').ok_or_else(malformed)?;
        let (start, end) = range.split_once('-').ok_or_else(malformed)?;

        ContentRange::new(
            parse_number(start, input)?,
            parse_number(end, input)?,
            parse_number(total, input)?,
        )
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes {}-{}/{}", self.start, self.end, self.total)
    }
}
