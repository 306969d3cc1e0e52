//! Derivation of the byte ranges that reproduce a source object's part layout.

use std::iter::FusedIterator;

use bytesize::TIB;
use thiserror::Error;

/// The maximum size of an S3 object, 5 TiB.
pub const MAX_SOURCE_SIZE: u64 = 5 * TIB;

/// The maximum number of parts in an S3 multipart upload.
pub const MAX_PART_COUNT: u32 = 10_000;

/// Errors that can occur when creating a [SourceLayout].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("part_size must be greater than 0")]
    ZeroPartSize,
    #[error("part_count must be at least 1")]
    ZeroPartCount,
    #[error("part_count must be at most {MAX_PART_COUNT}, part_count was {0}")]
    TooManyParts(u32),
    #[error("S3 Object must be at most {MAX_SOURCE_SIZE} bytes, Object size was {0}")]
    TooLarge(u64),
    #[error(
        "{part_count} parts of {part_size} bytes can not hold {total_size} bytes with a shorter final part"
    )]
    Inconsistent {
        total_size: u64,
        part_count: u32,
        part_size: u64,
    },
}

/// The part layout of a multipart source object.
///
/// Every part except the last is `part_size` bytes long, and the last part
/// holds whatever remains. Construction checks that
/// `part_size * (part_count - 1) < total_size <= part_size * part_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLayout {
    total_size: u64,
    part_count: u32,
    part_size: u64,
}

impl SourceLayout {
    pub fn new(total_size: u64, part_count: u32, part_size: u64) -> Result<Self, LayoutError> {
        if part_size == 0 {
            return Err(LayoutError::ZeroPartSize);
        }
        if part_count == 0 {
            return Err(LayoutError::ZeroPartCount);
        }
        if part_count > MAX_PART_COUNT {
            return Err(LayoutError::TooManyParts(part_count));
        }
        if total_size > MAX_SOURCE_SIZE {
            return Err(LayoutError::TooLarge(total_size));
        }

        let inconsistent = LayoutError::Inconsistent {
            total_size,
            part_count,
            part_size,
        };
        let full_parts = part_size
            .checked_mul(u64::from(part_count - 1))
            .ok_or_else(|| inconsistent.clone())?;
        // A capacity past u64::MAX always holds `total_size`.
        let capacity = part_size.checked_mul(u64::from(part_count));
        if full_parts >= total_size || capacity.is_some_and(|capacity| total_size > capacity) {
            return Err(inconsistent);
        }

        Ok(SourceLayout {
            total_size,
            part_count,
            part_size,
        })
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn part_count(&self) -> u32 {
        self.part_count
    }

    pub fn part_size(&self) -> u64 {
        self.part_size
    }
}

/// One part of the copy: a 1-based part number and an inclusive byte range
/// of the source object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    pub part_number: u32,
    pub start: u64,
    pub end: u64,
}

impl PartRange {
    /// Number of bytes in the part.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Generates the `x-amz-copy-source-range` value for the part.
    ///
    /// ```
    /// use s3_part_copy::s3::PartRange;
    ///
    /// let range = PartRange { part_number: 2, start: 500, end: 999 };
    /// assert_eq!(range.copy_source_range(), "bytes=500-999");
    /// ```
    pub fn copy_source_range(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// The ordered set of [PartRange]s for a [SourceLayout].
///
/// The plan is computed lazily and may be iterated any number of times;
/// every call to [PartPlan::iter] starts again from part 1.
///
/// ```
/// use s3_part_copy::s3::{PartPlan, SourceLayout};
///
/// let plan = PartPlan::new(SourceLayout::new(25, 3, 10).unwrap());
/// let ranges: Vec<_> = plan.iter().map(|r| (r.part_number, r.start, r.end)).collect();
/// assert_eq!(ranges, vec![(1, 0, 9), (2, 10, 19), (3, 20, 24)]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    layout: SourceLayout,
}

impl PartPlan {
    pub fn new(layout: SourceLayout) -> Self {
        PartPlan { layout }
    }

    pub fn layout(&self) -> &SourceLayout {
        &self.layout
    }

    /// Number of parts in the plan.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.iter().len()
    }

    pub fn iter(&self) -> PartRanges {
        PartRanges {
            part_size: self.layout.part_size,
            part_count: self.layout.part_count,
            next_part: 1,
            offset: 0,
            remaining: self.layout.total_size,
        }
    }

    /// The final range of the plan.
    pub fn last(&self) -> Option<PartRange> {
        self.iter().last()
    }
}

impl<'a> IntoIterator for &'a PartPlan {
    type Item = PartRange;
    type IntoIter = PartRanges;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the [PartRange]s of a [PartPlan].
#[derive(Debug, Clone)]
pub struct PartRanges {
    part_size: u64,
    part_count: u32,
    next_part: u32,
    offset: u64,
    remaining: u64,
}

impl Iterator for PartRanges {
    type Item = PartRange;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_part > self.part_count {
            return None;
        }
        let length = self.part_size.min(self.remaining);
        let range = PartRange {
            part_number: self.next_part,
            start: self.offset,
            end: self.offset + length - 1,
        };
        self.next_part += 1;
        self.offset += length;
        self.remaining -= length;
        Some(range)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.part_count + 1 - self.next_part) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for PartRanges {}

impl FusedIterator for PartRanges {}

#[cfg(any(test, feature = "test-utils"))]
pub mod arbitrary {
    use proptest::prelude::*;

    use super::{SourceLayout, MAX_PART_COUNT, MAX_SOURCE_SIZE};

    /// Generates layouts that S3 could report for a multipart object: at least
    /// two parts, and a final part between 1 byte and a full part.
    impl Arbitrary for SourceLayout {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            (2..=MAX_PART_COUNT)
                .prop_flat_map(|part_count| {
                    let max_part_size = MAX_SOURCE_SIZE / u64::from(part_count);
                    (Just(part_count), 1..=max_part_size)
                })
                .prop_flat_map(|(part_count, part_size)| {
                    (Just(part_count), Just(part_size), 1..=part_size)
                })
                .prop_map(|(part_count, part_size, last_part)| {
                    let total = part_size * u64::from(part_count - 1) + last_part;
                    SourceLayout::new(total, part_count, part_size)
                        .expect("generated layout is consistent")
                })
                .boxed()
        }
    }
}
