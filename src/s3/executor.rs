use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::stream::{self, StreamExt, TryStreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use typed_builder::TypedBuilder;

use super::retry::Exhausted;
use super::{
    CopySession, PartPlan, PartRange, PartResult, RetryPolicy, S3Object, StoreTransport,
    TransportError,
};

/// Default number of parts which can be copied concurrently.
pub const DEFAULT_MAX_CONCURRENT_COPIES: usize = 32;

/// Errors raised while copying the parts of an object.
#[derive(Debug, Error)]
pub enum PartCopyError {
    #[error("Copy of part {part_number} failed after {attempts} attempt(s): {source}")]
    Failed {
        part_number: u32,
        attempts: u32,
        #[source]
        source: TransportError,
    },
    #[error("Copy of part {part_number} was cancelled")]
    Cancelled { part_number: u32 },
}

/// Receives progress updates while parts are copied.
pub trait CopyProgress: Debug + Send + Sync {
    /// Called once before the first part is dispatched.
    fn started(&self, _total: usize) {}

    /// Called each time a part completes. `completed` counts every
    /// part finished so far, in completion order.
    fn part_completed(&self, completed: usize, total: usize);
}

/// Ignores all progress updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl CopyProgress for NoProgress {
    fn part_completed(&self, _completed: usize, _total: usize) {}
}

/// Logs progress at `info` level every time another `step` percent of the
/// parts has been copied.
#[derive(Debug, Clone, Copy)]
pub struct LogProgress {
    step: usize,
}

impl LogProgress {
    pub fn every_percent(step: usize) -> Self {
        LogProgress {
            step: step.clamp(1, 100),
        }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        LogProgress::every_percent(10)
    }
}

impl CopyProgress for LogProgress {
    fn started(&self, total: usize) {
        tracing::info!(total, "Copying parts");
    }

    fn part_completed(&self, completed: usize, total: usize) {
        let percent = completed * 100 / total.max(1);
        let previous = completed.saturating_sub(1) * 100 / total.max(1);
        if completed == total || percent / self.step > previous / self.step {
            tracing::info!(completed, total, percent, "Copy progress");
        }
    }
}

/// Copies every range of a [PartPlan] into a [CopySession].
///
/// At most `max_concurrent_copies` copies are in flight at a time, and
/// ranges are only taken from the plan as copies finish. Transient
/// failures are retried according to `retry`. The first failure cancels
/// the remaining copies.
#[derive(Debug, TypedBuilder)]
pub struct PartCopyExecutor<'a> {
    transport: &'a dyn StoreTransport,
    #[builder(default = DEFAULT_MAX_CONCURRENT_COPIES)]
    max_concurrent_copies: usize,
    retry: &'a RetryPolicy,
    progress: &'a dyn CopyProgress,
    cancellation: &'a CancellationToken,
}

impl PartCopyExecutor<'_> {
    /// Copies all parts, returning their results sorted by part number.
    #[instrument(skip_all, fields(upload_id = %session.token, parts = plan.len()))]
    pub async fn execute(
        &self,
        session: &CopySession,
        source: &S3Object,
        plan: &PartPlan,
    ) -> Result<Vec<PartResult>, PartCopyError> {
        let total = plan.len();
        let completed = AtomicUsize::new(0);
        let cancellation = self.cancellation.child_token();
        self.progress.started(total);

        let mut parts: Vec<PartResult> = stream::iter(plan.iter())
            .map(|range| {
                let completed = &completed;
                let cancellation = &cancellation;
                async move {
                    let result = tokio::select! {
                        biased;
                        _ = cancellation.cancelled() => Err(PartCopyError::Cancelled {
                            part_number: range.part_number,
                        }),
                        result = self.copy_part(session, source, &range) => result,
                    };
                    match result {
                        Ok(part) => {
                            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                            self.progress.part_completed(done, total);
                            Ok(part)
                        }
                        Err(e) => {
                            cancellation.cancel();
                            Err(e)
                        }
                    }
                }
            })
            .buffer_unordered(self.max_concurrent_copies.max(1))
            .try_collect()
            .await?;

        parts.sort_by_key(|part| part.part_number);
        tracing::info!("All parts copied");
        Ok(parts)
    }

    async fn copy_part(
        &self,
        session: &CopySession,
        source: &S3Object,
        range: &PartRange,
    ) -> Result<PartResult, PartCopyError> {
        tracing::debug!(
            part_number = range.part_number,
            byte_range = range.copy_source_range(),
            "Copying"
        );
        self.retry
            .run(|_| self.transport.copy_range(session, source, range))
            .await
            .map(|integrity_token| PartResult {
                part_number: range.part_number,
                integrity_token,
            })
            .map_err(|Exhausted { attempts, error }| PartCopyError::Failed {
                part_number: range.part_number,
                attempts,
                source: error,
            })
    }
}
