//! `WorkItem`, `ProcessingStatus` and the supporting classifier functions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A closed enumeration of the states a work item can occupy.
///
/// Represented as a tagged variant rather than a sealed class hierarchy; callers
/// that need to know whether a status is a valid `complete()` argument or a valid
/// `cancel()` source use [`is_result_status`] / [`is_cancellable`] instead of
/// relying on a subtype relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessingStatus {
    /// Ready for pickup once `availableAt` is reached.
    #[serde(rename = "todo")]
    ToDo,
    /// A worker owns the item; hidden until the in-progress timeout elapses.
    InProgress,
    /// Terminal: processed successfully.
    Succeeded,
    /// Retryable failure; re-pullable after `failedBefore`.
    Failed,
    /// Terminal: will not be retried.
    PermanentlyFailed,
    /// Terminal: explicitly skipped.
    Ignored,
    /// Terminal: detected duplicate.
    Duplicate,
    /// Like `ToDo` but logically postponed; same pull treatment as `ToDo`.
    Deferred,
    /// Terminal: cancelled by operator request.
    Cancelled,
}

impl ProcessingStatus {
    /// The short string this status is encoded as on the wire.
    /// Kept as an explicit match rather than relying purely on `#[serde(rename)]`
    /// so callers building raw documents (the Mongo backend's query filters) don't
    /// need to round-trip through serde to get the literal.
    pub fn wire_name(self) -> &'static str {
        match self {
            ProcessingStatus::ToDo => "todo",
            ProcessingStatus::InProgress => "in-progress",
            ProcessingStatus::Succeeded => "succeeded",
            ProcessingStatus::Failed => "failed",
            ProcessingStatus::PermanentlyFailed => "permanently-failed",
            ProcessingStatus::Ignored => "ignored",
            ProcessingStatus::Duplicate => "duplicate",
            ProcessingStatus::Deferred => "deferred",
            ProcessingStatus::Cancelled => "cancelled",
        }
    }
}

/// Returns `true` for the terminal statuses that are valid arguments to `complete()`.
pub fn is_result_status(status: ProcessingStatus) -> bool {
    matches!(
        status,
        ProcessingStatus::Succeeded
            | ProcessingStatus::PermanentlyFailed
            | ProcessingStatus::Ignored
            | ProcessingStatus::Duplicate
            | ProcessingStatus::Cancelled
    )
}

/// Returns `true` for statuses from which a transition to `Cancelled` is permitted.
pub fn is_cancellable(status: ProcessingStatus) -> bool {
    matches!(
        status,
        ProcessingStatus::ToDo
            | ProcessingStatus::Failed
            | ProcessingStatus::InProgress
            | ProcessingStatus::Deferred
    )
}

/// A persistent record wrapping a user payload `T`.
///
/// Invariants (enforced by the repository, never by this struct alone):
/// `received_at <= available_at` at creation, `updated_at` is monotonically
/// non-decreasing for a given id, `failure_count` increases only on transitions
/// landing on `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem<T> {
    pub id: String,
    pub received_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub available_at: DateTime<Utc>,
    pub status: ProcessingStatus,
    pub failure_count: u64,
    pub item: T,
}

/// External, configurable field names for the persisted `WorkItem` document.
///
/// Passed into repository constructors so collection schemas can evolve without
/// recompiling callers onto hard-coded names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItemFieldNames {
    pub id: String,
    pub received_at: String,
    pub updated_at: String,
    pub available_at: String,
    pub status: String,
    pub failure_count: String,
    pub item: String,
}

impl Default for WorkItemFieldNames {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            received_at: "receivedAt".to_string(),
            updated_at: "updatedAt".to_string(),
            available_at: "availableAt".to_string(),
            status: "status".to_string(),
            failure_count: "failureCount".to_string(),
            item: "item".to_string(),
        }
    }
}

/// Outcome of a [`super::traits::WorkItemRepository::cancel`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdateResult {
    /// The transition occurred.
    Updated {
        previous: ProcessingStatus,
        new: ProcessingStatus,
    },
    /// The item exists but was not in a cancellable status.
    NotUpdated { current: ProcessingStatus },
    /// No record matches the given id.
    NotFound,
}
