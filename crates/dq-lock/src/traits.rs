//! Core `LockRepository` trait.

use crate::error::LockError;
use async_trait::async_trait;
use std::time::Duration;

/// Core trait for lock repository backends.
///
/// TTL is supplied per call; identity is a free-form `owner` string (typically a
/// process id or instance id). No operation holds an in-memory lock across a
/// suspension point other than the single critical section each backend uses to
/// make acquisition atomic.
#[async_trait]
pub trait LockRepository: Send + Sync {
    /// Conditional acquisition. Sets `{id, owner, time_created: now, expiry_time:
    /// now+ttl}` iff no non-expired record for `id` exists. Returns `true` on
    /// acquisition.
    async fn lock(&self, lock_id: &str, owner: &str, ttl: Duration) -> Result<bool, LockError>;

    /// Extends an already-held lock. Matches `{id, owner}` with no expiry check —
    /// the owner may re-extend even if its window already slipped, as long as no
    /// other holder has taken over. Does not create a new lock if none exists.
    async fn refresh_expiry(&self, lock_id: &str, owner: &str, ttl: Duration) -> Result<bool, LockError>;

    /// Deletes any record matching `{id, owner}`. Idempotent; leaves locks owned
    /// by others untouched.
    async fn release_lock(&self, lock_id: &str, owner: &str) -> Result<(), LockError>;

    /// `true` iff a record exists matching `{id, owner}` with `expiry_time > now`.
    async fn is_locked(&self, lock_id: &str, owner: &str) -> Result<bool, LockError>;
}
