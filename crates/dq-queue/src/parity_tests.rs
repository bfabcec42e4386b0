//! Shared parity assertions for work-item repository backends.
//!
//! Each function takes a `&dyn WorkItemRepository<String>` so the same
//! assertions apply to `InMemoryWorkItemRepository` and `MongoWorkItemRepository`.
//! Backend-specific test modules call these with their own repository instance.

use crate::model::{ProcessingStatus, StatusUpdateResult};
use crate::traits::WorkItemRepository;
use chrono::Utc;

pub async fn test_push_and_find(repo: &dyn WorkItemRepository<String>) {
    let t0 = Utc::now();
    let created = repo.push_new("hello".to_string(), t0).await.unwrap();
    assert_eq!(created.status, ProcessingStatus::ToDo);
    assert_eq!(created.received_at, t0);
    assert_eq!(created.available_at, t0);

    let found = repo.find_by_id(&created.id).await.unwrap().unwrap();
    assert_eq!(found.item, "hello");
}

pub async fn test_find_missing_returns_none(repo: &dyn WorkItemRepository<String>) {
    assert!(repo.find_by_id("does-not-exist").await.unwrap().is_none());
}

pub async fn test_pull_claims_exactly_once(repo: &dyn WorkItemRepository<String>) {
    let t0 = Utc::now();
    let created = repo.push_new("only-one".to_string(), t0).await.unwrap();
    let horizon = t0 + chrono::Duration::seconds(1);

    let first = repo.pull_outstanding(horizon, horizon).await.unwrap().unwrap();
    assert_eq!(first.id, created.id);
    assert_eq!(first.status, ProcessingStatus::InProgress);

    let second = repo.pull_outstanding(horizon, horizon).await.unwrap();
    assert!(second.is_none());
}

pub async fn test_complete_requires_in_progress(repo: &dyn WorkItemRepository<String>) {
    let t0 = Utc::now();
    let created = repo.push_new("needs-in-progress".to_string(), t0).await.unwrap();

    assert!(!repo.complete(&created.id, ProcessingStatus::Succeeded).await.unwrap());

    let horizon = t0 + chrono::Duration::seconds(1);
    repo.pull_outstanding(horizon, horizon).await.unwrap();
    assert!(repo.complete(&created.id, ProcessingStatus::Succeeded).await.unwrap());

    let after = repo.find_by_id(&created.id).await.unwrap().unwrap();
    assert_eq!(after.status, ProcessingStatus::Succeeded);
}

pub async fn test_cancel_state_machine(repo: &dyn WorkItemRepository<String>) {
    let t0 = Utc::now();

    assert_eq!(repo.cancel("absent").await.unwrap(), StatusUpdateResult::NotFound);

    let terminal = repo
        .push_new_with("done".to_string(), t0, t0, ProcessingStatus::Succeeded)
        .await
        .unwrap();
    assert_eq!(
        repo.cancel(&terminal.id).await.unwrap(),
        StatusUpdateResult::NotUpdated {
            current: ProcessingStatus::Succeeded
        }
    );

    let todo = repo.push_new("pending".to_string(), t0).await.unwrap();
    assert_eq!(
        repo.cancel(&todo.id).await.unwrap(),
        StatusUpdateResult::Updated {
            previous: ProcessingStatus::ToDo,
            new: ProcessingStatus::Cancelled,
        }
    );
}

pub async fn test_failure_count_tracks_failed_transitions(repo: &dyn WorkItemRepository<String>) {
    let t0 = Utc::now();
    let created = repo.push_new("flaky".to_string(), t0).await.unwrap();

    repo.mark_as(&created.id, ProcessingStatus::Failed, None).await.unwrap();
    repo.mark_as(&created.id, ProcessingStatus::ToDo, None).await.unwrap();
    repo.mark_as(&created.id, ProcessingStatus::Failed, None).await.unwrap();

    let after = repo.find_by_id(&created.id).await.unwrap().unwrap();
    assert_eq!(after.failure_count, 2);
}

pub async fn test_metrics_counts_every_status(repo: &dyn WorkItemRepository<String>) {
    let t0 = Utc::now();
    repo.push_new("a".to_string(), t0).await.unwrap();
    repo.push_new("b".to_string(), t0).await.unwrap();

    let metrics = repo.metrics("parity").await.unwrap();
    assert_eq!(metrics.get("parity.todo"), Some(&2));
}
