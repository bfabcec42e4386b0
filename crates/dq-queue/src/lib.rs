//! Persistent multi-producer/multi-consumer work-item queue.
//!
//! Built on top of a document-oriented datastore's atomic single-document
//! find-and-update. Items survive process restarts; at most one worker
//! processes a given item at a time, enforced entirely through the datastore's
//! conditional update rather than any in-process lock.
//!
//! ```
//! use dq_core::{Clock, TestClock};
//! use dq_queue::{InMemoryWorkItemRepository, ProcessingStatus, WorkItemRepository};
//!
//! # async fn example() {
//! let clock = TestClock::new(chrono::Utc::now());
//! let repo = InMemoryWorkItemRepository::new(clock.clone(), chrono::Duration::minutes(5));
//!
//! let item = repo.push_new("send-welcome-email".to_string(), clock.now()).await.unwrap();
//! let horizon = clock.now() + chrono::Duration::seconds(1);
//! let claimed = repo.pull_outstanding(horizon, horizon).await.unwrap().unwrap();
//! assert_eq!(claimed.id, item.id);
//! assert_eq!(claimed.status, ProcessingStatus::InProgress);
//!
//! repo.complete(&claimed.id, ProcessingStatus::Succeeded).await.unwrap();
//! # }
//! ```

pub mod error;
#[cfg(feature = "in-memory")]
pub mod in_memory;
#[cfg(feature = "mongodb")]
pub mod mongo;
pub mod model;
pub mod traits;

#[cfg(test)]
pub(crate) mod parity_tests;

pub use error::WorkItemError;
#[cfg(feature = "in-memory")]
pub use in_memory::InMemoryWorkItemRepository;
pub use model::{is_cancellable, is_result_status, ProcessingStatus, StatusUpdateResult, WorkItem, WorkItemFieldNames};
#[cfg(feature = "mongodb")]
pub use mongo::{MongoWorkItemConfig, MongoWorkItemRepository};
pub use traits::WorkItemRepository;
