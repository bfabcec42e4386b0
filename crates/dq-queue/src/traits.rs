//! Core `WorkItemRepository` trait.

use crate::error::WorkItemError;
use crate::model::{ProcessingStatus, StatusUpdateResult, WorkItem};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Core trait for work-item repository backends.
///
/// Implementations must be `Send + Sync`. No operation holds an in-memory lock
/// across a suspension point other than the single critical section each backend
/// uses to make its claim atomic; mutual exclusion otherwise flows entirely
/// through the backing datastore's conditional update.
#[async_trait]
pub trait WorkItemRepository<T>: Send + Sync
where
    T: Send + Sync + Clone + 'static,
{
    /// Create a single item with a freshly minted id.
    async fn push_new_with(
        &self,
        item: T,
        received_at: DateTime<Utc>,
        available_at: DateTime<Utc>,
        initial_status: ProcessingStatus,
    ) -> Result<WorkItem<T>, WorkItemError>;

    /// Convenience overload: `availableAt = receivedAt`, initial status `ToDo`.
    async fn push_new(&self, item: T, received_at: DateTime<Utc>) -> Result<WorkItem<T>, WorkItemError> {
        self.push_new_with(item, received_at, received_at, ProcessingStatus::ToDo)
            .await
    }

    /// Batch variant. All items share `received_at`, `available_at` and the
    /// `initial_status` callback. Fails with [`WorkItemError::PartialInsert`] if
    /// the datastore acknowledges fewer inserts than items supplied.
    async fn push_new_batch_with(
        &self,
        items: Vec<T>,
        received_at: DateTime<Utc>,
        available_at: DateTime<Utc>,
        initial_status: &(dyn for<'a> Fn(&'a T) -> ProcessingStatus + Send + Sync),
    ) -> Result<Vec<WorkItem<T>>, WorkItemError>;

    /// Convenience overload of the batch push: `availableAt = receivedAt`,
    /// initial status always `ToDo`.
    async fn push_new_batch(
        &self,
        items: Vec<T>,
        received_at: DateTime<Utc>,
    ) -> Result<Vec<WorkItem<T>>, WorkItemError> {
        self.push_new_batch_with(items, received_at, received_at, &|_| ProcessingStatus::ToDo)
            .await
    }

    /// Atomically select and claim the next processable item, per the strict
    /// three-bucket priority order (fresh `ToDo`/`Deferred` work, then `Failed`
    /// retries, then rescue of stuck `InProgress` items). Returns `None` when
    /// nothing is eligible.
    async fn pull_outstanding(
        &self,
        failed_before: DateTime<Utc>,
        available_before: DateTime<Utc>,
    ) -> Result<Option<WorkItem<T>>, WorkItemError>;

    /// Unconditional status transition. Increments `failure_count` iff the new
    /// status is `Failed`. Returns whether a record matched.
    async fn mark_as(
        &self,
        id: &str,
        status: ProcessingStatus,
        available_at: Option<DateTime<Utc>>,
    ) -> Result<bool, WorkItemError>;

    /// Conditional transition to a result status: only succeeds if the current
    /// status is `InProgress`. Returns
    /// [`WorkItemError::InvalidResultStatus`] if `result_status` is not a member
    /// of [`crate::model::is_result_status`].
    async fn complete(&self, id: &str, result_status: ProcessingStatus) -> Result<bool, WorkItemError>;

    /// Attempts a transition to `Cancelled`, gated on [`crate::model::is_cancellable`].
    async fn cancel(&self, id: &str) -> Result<StatusUpdateResult, WorkItemError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<WorkItem<T>>, WorkItemError>;

    async fn count(&self, status: ProcessingStatus) -> Result<u64, WorkItemError>;

    /// One entry per status, key = `"<prefix>.<statusName>"`.
    async fn metrics(&self, prefix: &str) -> Result<HashMap<String, u64>, WorkItemError> {
        let mut out = HashMap::new();
        for status in [
            ProcessingStatus::ToDo,
            ProcessingStatus::InProgress,
            ProcessingStatus::Succeeded,
            ProcessingStatus::Failed,
            ProcessingStatus::PermanentlyFailed,
            ProcessingStatus::Ignored,
            ProcessingStatus::Duplicate,
            ProcessingStatus::Deferred,
            ProcessingStatus::Cancelled,
        ] {
            let count = self.count(status).await?;
            out.insert(format!("{prefix}.{}", status.wire_name()), count);
        }
        Ok(out)
    }
}
