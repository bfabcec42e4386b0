//! Named distributed lock registry with TTL-based expiry.
//!
//! A lock is advisory: cooperating processes respect it voluntarily, and clock
//! skew around the expiry boundary can let two holders briefly believe they each
//! own the same lock. Applications needing a fencing token must compose one
//! externally; this crate does not provide one.
//!
//! ```
//! use dq_core::{Clock, TestClock};
//! use dq_lock::{InMemoryLockRepository, LockRepository};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let clock = TestClock::new(chrono::Utc::now());
//! let repo = InMemoryLockRepository::new(clock.clone());
//!
//! assert!(repo.lock("nightly-export", "worker-7", Duration::from_secs(30)).await.unwrap());
//! assert!(!repo.lock("nightly-export", "worker-8", Duration::from_secs(30)).await.unwrap());
//! repo.release_lock("nightly-export", "worker-7").await.unwrap();
//! # }
//! ```

pub mod error;
#[cfg(feature = "in-memory")]
pub mod in_memory;
#[cfg(feature = "mongodb")]
pub mod mongo;
pub mod model;
pub mod traits;

pub use error::LockError;
#[cfg(feature = "in-memory")]
pub use in_memory::InMemoryLockRepository;
pub use model::Lock;
#[cfg(feature = "mongodb")]
pub use mongo::MongoLockRepository;
pub use traits::LockRepository;
