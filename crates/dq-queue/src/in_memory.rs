//! In-memory work-item repository.
//!
//! Suitable for development, testing, and single-instance deployments. Items
//! are stored in a `HashMap` behind a `RwLock`; the three-bucket scan in
//! `pull_outstanding` runs under a single write-lock acquisition so concurrent
//! callers still observe exactly one winner per eligible item, matching the
//! atomicity a real datastore's `findOneAndUpdate` would provide.

use crate::error::WorkItemError;
use crate::model::{is_cancellable, is_result_status, ProcessingStatus, StatusUpdateResult, WorkItem};
use crate::traits::WorkItemRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dq_core::Clock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory work-item repository backend.
pub struct InMemoryWorkItemRepository<T, C: Clock> {
    items: Arc<RwLock<HashMap<String, WorkItem<T>>>>,
    clock: C,
    in_progress_retry_after: chrono::Duration,
}

impl<T, C: Clock> InMemoryWorkItemRepository<T, C> {
    /// `in_progress_retry_after` is fixed at construction, not reread per call,
    /// so a running repository has one stable stuck-pickup cutoff.
    pub fn new(clock: C, in_progress_retry_after: chrono::Duration) -> Self {
        Self {
            items: Arc::new(RwLock::new(HashMap::new())),
            clock,
            in_progress_retry_after,
        }
    }
}

fn new_id() -> String {
    Uuid::now_v7().to_string()
}

#[async_trait]
impl<T, C> WorkItemRepository<T> for InMemoryWorkItemRepository<T, C>
where
    T: Send + Sync + Clone + 'static,
    C: Clock,
{
    async fn push_new_with(
        &self,
        item: T,
        received_at: DateTime<Utc>,
        available_at: DateTime<Utc>,
        initial_status: ProcessingStatus,
    ) -> Result<WorkItem<T>, WorkItemError> {
        let work_item = WorkItem {
            id: new_id(),
            received_at,
            updated_at: self.clock.now(),
            available_at,
            status: initial_status,
            failure_count: 0,
            item,
        };
        let mut items = self.items.write().await;
        items.insert(work_item.id.clone(), work_item.clone());
        Ok(work_item)
    }

    async fn push_new_batch_with(
        &self,
        items: Vec<T>,
        received_at: DateTime<Utc>,
        available_at: DateTime<Utc>,
        initial_status: &(dyn for<'a> Fn(&'a T) -> ProcessingStatus + Send + Sync),
    ) -> Result<Vec<WorkItem<T>>, WorkItemError> {
        let now = self.clock.now();
        let created: Vec<WorkItem<T>> = items
            .into_iter()
            .map(|item| {
                let status = initial_status(&item);
                WorkItem {
                    id: new_id(),
                    received_at,
                    updated_at: now,
                    available_at,
                    status,
                    failure_count: 0,
                    item,
                }
            })
            .collect();

        let mut guard = self.items.write().await;
        for work_item in &created {
            guard.insert(work_item.id.clone(), work_item.clone());
        }
        Ok(created)
    }

    async fn pull_outstanding(
        &self,
        failed_before: DateTime<Utc>,
        available_before: DateTime<Utc>,
    ) -> Result<Option<WorkItem<T>>, WorkItemError> {
        let now = self.clock.now();
        let stuck_cutoff = now - self.in_progress_retry_after;
        let mut items = self.items.write().await;

        // Bucket 1: ToDo/Deferred, ready. Bucket 2: Failed retries. Bucket 3: rescue.
        // Within a bucket, earliest available_at/received_at wins for a stable pick.
        let candidate = items
            .values()
            .filter(|w| {
                matches!(w.status, ProcessingStatus::ToDo | ProcessingStatus::Deferred)
                    && w.available_at < available_before
            })
            .min_by_key(|w| (w.available_at, w.received_at, w.id.clone()))
            .map(|w| w.id.clone())
            .or_else(|| {
                items
                    .values()
                    .filter(|w| {
                        w.status == ProcessingStatus::Failed
                            && w.updated_at < failed_before
                            && w.available_at < available_before
                    })
                    .min_by_key(|w| (w.updated_at, w.id.clone()))
                    .map(|w| w.id.clone())
            })
            .or_else(|| {
                items
                    .values()
                    .filter(|w| w.status == ProcessingStatus::InProgress && w.updated_at < stuck_cutoff)
                    .min_by_key(|w| (w.updated_at, w.id.clone()))
                    .map(|w| w.id.clone())
            });

        match candidate {
            Some(id) => {
                let work_item = items.get_mut(&id).expect("candidate id came from this map");
                work_item.status = ProcessingStatus::InProgress;
                work_item.updated_at = now;
                Ok(Some(work_item.clone()))
            }
            None => Ok(None),
        }
    }

    async fn mark_as(
        &self,
        id: &str,
        status: ProcessingStatus,
        available_at: Option<DateTime<Utc>>,
    ) -> Result<bool, WorkItemError> {
        let mut items = self.items.write().await;
        let Some(work_item) = items.get_mut(id) else {
            return Ok(false);
        };
        work_item.status = status;
        work_item.updated_at = self.clock.now();
        if let Some(available_at) = available_at {
            work_item.available_at = available_at;
        }
        if status == ProcessingStatus::Failed {
            work_item.failure_count += 1;
        }
        Ok(true)
    }

    async fn complete(&self, id: &str, result_status: ProcessingStatus) -> Result<bool, WorkItemError> {
        if !is_result_status(result_status) {
            return Err(WorkItemError::InvalidResultStatus { status: result_status });
        }
        let mut items = self.items.write().await;
        let Some(work_item) = items.get_mut(id) else {
            return Ok(false);
        };
        if work_item.status != ProcessingStatus::InProgress {
            return Ok(false);
        }
        work_item.status = result_status;
        work_item.updated_at = self.clock.now();
        Ok(true)
    }

    async fn cancel(&self, id: &str) -> Result<StatusUpdateResult, WorkItemError> {
        let mut items = self.items.write().await;
        let Some(work_item) = items.get_mut(id) else {
            return Ok(StatusUpdateResult::NotFound);
        };
        if !is_cancellable(work_item.status) {
            return Ok(StatusUpdateResult::NotUpdated {
                current: work_item.status,
            });
        }
        let previous = work_item.status;
        work_item.status = ProcessingStatus::Cancelled;
        work_item.updated_at = self.clock.now();
        Ok(StatusUpdateResult::Updated {
            previous,
            new: ProcessingStatus::Cancelled,
        })
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<WorkItem<T>>, WorkItemError> {
        Ok(self.items.read().await.get(id).cloned())
    }

    async fn count(&self, status: ProcessingStatus) -> Result<u64, WorkItemError> {
        Ok(self
            .items
            .read()
            .await
            .values()
            .filter(|w| w.status == status)
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dq_core::TestClock;

    fn repo(
        start: DateTime<Utc>,
        in_progress_retry_after: chrono::Duration,
    ) -> (InMemoryWorkItemRepository<&'static str, TestClock>, TestClock) {
        let clock = TestClock::new(start);
        (InMemoryWorkItemRepository::new(clock.clone(), in_progress_retry_after), clock)
    }

    // A ToDo item available now is pulled; a concurrent second pull gets None.
    #[tokio::test]
    async fn pull_todo_then_exhausted() {
        let t0 = Utc::now();
        let (repo, clock) = repo(t0, chrono::Duration::seconds(30));
        repo.push_new("payload", t0).await.unwrap();

        clock.advance(chrono::Duration::milliseconds(1));
        let t1 = clock.now();
        let pulled = repo
            .pull_outstanding(t1 + chrono::Duration::seconds(1), t1 + chrono::Duration::seconds(1))
            .await
            .unwrap()
            .expect("item should be pulled");
        assert_eq!(pulled.status, ProcessingStatus::InProgress);
        assert_eq!(pulled.updated_at, t1);

        let second = repo
            .pull_outstanding(t1 + chrono::Duration::seconds(1), t1 + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert!(second.is_none());
    }

    // Stuck InProgress is rescued after the timeout, without incrementing failure_count.
    #[tokio::test]
    async fn stuck_in_progress_is_rescued() {
        let t0 = Utc::now();
        let retry_after = chrono::Duration::milliseconds(100);
        let (repo, clock) = repo(t0, retry_after);
        let item = repo.push_new("payload", t0).await.unwrap();

        let first = repo
            .pull_outstanding(t0 + chrono::Duration::seconds(1), t0 + chrono::Duration::seconds(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.id, item.id);

        clock.advance(retry_after + chrono::Duration::milliseconds(1));
        let now = clock.now();
        let rescued = repo
            .pull_outstanding(now + chrono::Duration::seconds(1), now + chrono::Duration::seconds(1))
            .await
            .unwrap()
            .expect("stuck item should be rescued");
        assert_eq!(rescued.id, item.id);
        assert_eq!(rescued.failure_count, 0);
    }

    // complete() is a no-op on ToDo, succeeds on InProgress.
    #[tokio::test]
    async fn complete_requires_in_progress() {
        let t0 = Utc::now();
        let (repo, _clock) = repo(t0, chrono::Duration::seconds(30));
        let item = repo.push_new("payload", t0).await.unwrap();

        let ok = repo.complete(&item.id, ProcessingStatus::Succeeded).await.unwrap();
        assert!(!ok);
        let unchanged = repo.find_by_id(&item.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, ProcessingStatus::ToDo);

        repo.pull_outstanding(t0 + chrono::Duration::seconds(1), t0 + chrono::Duration::seconds(1))
            .await
            .unwrap();
        let ok = repo.complete(&item.id, ProcessingStatus::Succeeded).await.unwrap();
        assert!(ok);
        let after = repo.find_by_id(&item.id).await.unwrap().unwrap();
        assert_eq!(after.status, ProcessingStatus::Succeeded);
    }

    #[tokio::test]
    async fn complete_rejects_non_result_status() {
        let t0 = Utc::now();
        let (repo, _clock) = repo(t0, chrono::Duration::seconds(30));
        let item = repo.push_new("payload", t0).await.unwrap();
        repo.pull_outstanding(t0 + chrono::Duration::seconds(1), t0 + chrono::Duration::seconds(1))
            .await
            .unwrap();

        let err = repo.complete(&item.id, ProcessingStatus::ToDo).await.unwrap_err();
        assert!(matches!(err, WorkItemError::InvalidResultStatus { .. }));
    }

    // cancel() on NotFound / terminal / cancellable.
    #[tokio::test]
    async fn cancel_outcomes() {
        let t0 = Utc::now();
        let (repo, _clock) = repo(t0, chrono::Duration::seconds(30));

        assert_eq!(repo.cancel("missing").await.unwrap(), StatusUpdateResult::NotFound);

        let succeeded_item = repo
            .push_new_with(
                "payload",
                t0,
                t0,
                ProcessingStatus::Succeeded,
            )
            .await
            .unwrap();
        assert_eq!(
            repo.cancel(&succeeded_item.id).await.unwrap(),
            StatusUpdateResult::NotUpdated {
                current: ProcessingStatus::Succeeded
            }
        );

        let todo_item = repo.push_new("payload", t0).await.unwrap();
        assert_eq!(
            repo.cancel(&todo_item.id).await.unwrap(),
            StatusUpdateResult::Updated {
                previous: ProcessingStatus::ToDo,
                new: ProcessingStatus::Cancelled,
            }
        );
    }

    #[tokio::test]
    async fn mark_as_failed_increments_failure_count_by_one() {
        let t0 = Utc::now();
        let (repo, _clock) = repo(t0, chrono::Duration::seconds(30));
        let item = repo.push_new("payload", t0).await.unwrap();

        assert!(repo.mark_as(&item.id, ProcessingStatus::Failed, None).await.unwrap());
        assert_eq!(repo.find_by_id(&item.id).await.unwrap().unwrap().failure_count, 1);

        assert!(repo.mark_as(&item.id, ProcessingStatus::Failed, None).await.unwrap());
        assert_eq!(repo.find_by_id(&item.id).await.unwrap().unwrap().failure_count, 2);

        // A non-Failed transition does not touch the counter.
        assert!(repo
            .mark_as(&item.id, ProcessingStatus::Ignored, None)
            .await
            .unwrap());
        assert_eq!(repo.find_by_id(&item.id).await.unwrap().unwrap().failure_count, 2);
    }

    #[tokio::test]
    async fn mark_as_missing_id_returns_false() {
        let t0 = Utc::now();
        let (repo, _clock) = repo(t0, chrono::Duration::seconds(30));
        assert!(!repo.mark_as("missing", ProcessingStatus::Failed, None).await.unwrap());
    }

    #[tokio::test]
    async fn fresh_todo_wins_over_failed_retry_and_stuck_in_progress() {
        let t0 = Utc::now();
        let (repo, clock) = repo(t0, chrono::Duration::milliseconds(10));

        let stuck = repo.push_new("stuck", t0).await.unwrap();
        repo.pull_outstanding(t0 + chrono::Duration::seconds(1), t0 + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(
            repo.find_by_id(&stuck.id).await.unwrap().unwrap().status,
            ProcessingStatus::InProgress
        );

        let failed = repo.push_new("failed", t0).await.unwrap();
        repo.mark_as(&failed.id, ProcessingStatus::Failed, None).await.unwrap();

        clock.advance(chrono::Duration::milliseconds(50));
        let now = clock.now();
        let fresh = repo.push_new("fresh", now).await.unwrap();

        let pulled = repo
            .pull_outstanding(now + chrono::Duration::seconds(1), now + chrono::Duration::seconds(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pulled.id, fresh.id, "bucket 1 (ToDo) must win over buckets 2 and 3");
    }

    #[tokio::test]
    async fn metrics_reports_one_entry_per_status_with_prefix() {
        let t0 = Utc::now();
        let (repo, _clock) = repo(t0, chrono::Duration::seconds(30));
        repo.push_new("a", t0).await.unwrap();
        repo.push_new("b", t0).await.unwrap();

        let metrics = repo.metrics("queue").await.unwrap();
        assert_eq!(metrics.get("queue.todo"), Some(&2));
        assert_eq!(metrics.get("queue.succeeded"), Some(&0));
        assert_eq!(metrics.len(), 9);
    }

    #[tokio::test]
    async fn push_new_batch_fails_partial_insert_never_happens_in_memory_but_shares_timestamps() {
        let t0 = Utc::now();
        let (repo, _clock) = repo(t0, chrono::Duration::seconds(30));
        let created = repo.push_new_batch(vec!["a", "b", "c"], t0).await.unwrap();
        assert_eq!(created.len(), 3);
        for work_item in &created {
            assert_eq!(work_item.received_at, t0);
            assert_eq!(work_item.available_at, t0);
            assert_eq!(work_item.status, ProcessingStatus::ToDo);
        }
    }
}

#[cfg(test)]
mod parity {
    use super::InMemoryWorkItemRepository;
    use dq_core::SystemClock;

    fn repo() -> InMemoryWorkItemRepository<String, SystemClock> {
        InMemoryWorkItemRepository::new(SystemClock, chrono::Duration::minutes(5))
    }

    #[tokio::test]
    async fn push_and_find() {
        crate::parity_tests::test_push_and_find(&repo()).await;
    }

    #[tokio::test]
    async fn find_missing_returns_none() {
        crate::parity_tests::test_find_missing_returns_none(&repo()).await;
    }

    #[tokio::test]
    async fn pull_claims_exactly_once() {
        crate::parity_tests::test_pull_claims_exactly_once(&repo()).await;
    }

    #[tokio::test]
    async fn complete_requires_in_progress() {
        crate::parity_tests::test_complete_requires_in_progress(&repo()).await;
    }

    #[tokio::test]
    async fn cancel_state_machine() {
        crate::parity_tests::test_cancel_state_machine(&repo()).await;
    }

    #[tokio::test]
    async fn failure_count_tracks_failed_transitions() {
        crate::parity_tests::test_failure_count_tracks_failed_transitions(&repo()).await;
    }

    #[tokio::test]
    async fn metrics_counts_every_status() {
        crate::parity_tests::test_metrics_counts_every_status(&repo()).await;
    }
}
