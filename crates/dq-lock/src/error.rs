//! Error taxonomy for the lock repository.
//!
//! Duplicate-key collisions during acquisition are never surfaced as errors —
//! they are caught and translated to `Ok(false)` inside the backend. Every
//! other call either succeeds or returns a plain `bool`; infrastructure
//! failures are the only thing represented here.

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[cfg(feature = "mongodb")]
    #[error("datastore error: {0}")]
    Datastore(#[from] mongodb::error::Error),
}
