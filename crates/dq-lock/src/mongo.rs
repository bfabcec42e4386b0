//! MongoDB-backed lock repository.
//!
//! `lock()` is implemented as a single upsert `find_one_and_update` whose filter
//! matches "no record for this id" OR "record is expired" OR "record is owned by
//! me and expired". A unique index on `_id` makes racing upserts produce a
//! `DuplicateKey` error for every loser, which is caught here and translated to
//! `Ok(false)` rather than propagated.

use crate::error::LockError;
use crate::model::Lock;
use crate::traits::LockRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dq_core::Clock;
use mongodb::bson::{doc, Bson};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use mongodb::Collection;
use std::time::Duration;
use tracing::{debug, trace};

const DUPLICATE_KEY_CODE: i32 = 11000;

pub struct MongoLockRepository<C: Clock> {
    collection: Collection<Lock>,
    clock: C,
}

impl<C: Clock> MongoLockRepository<C> {
    /// The caller is responsible for ensuring the collection has a unique index
    /// on `_id` (the default for MongoDB's primary key, so usually nothing to do).
    pub fn new(collection: Collection<Lock>, clock: C) -> Self {
        Self { collection, clock }
    }
}

/// Converts through millisecond-since-epoch rather than `bson::DateTime::from_chrono`,
/// which needs the bson crate's `chrono-0_4` feature.
fn chrono_to_bson(dt: DateTime<Utc>) -> Bson {
    Bson::DateTime(mongodb::bson::DateTime::from_millis(dt.timestamp_millis()))
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

#[async_trait]
impl<C: Clock> LockRepository for MongoLockRepository<C> {
    async fn lock(&self, lock_id: &str, owner: &str, ttl: Duration) -> Result<bool, LockError> {
        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
        let expiry_time = now + ttl;

        let filter = doc! {
            "_id": lock_id,
            "$or": [
                { "expiryTime": { "$lte": chrono_to_bson(now) } },
                { "owner": owner, "expiryTime": { "$lte": chrono_to_bson(now) } },
            ],
        };
        let update = doc! {
            "$set": {
                "_id": lock_id,
                "owner": owner,
                "timeCreated": chrono_to_bson(now),
                "expiryTime": chrono_to_bson(expiry_time),
            }
        };
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        match self
            .collection
            .find_one_and_update(filter, update)
            .with_options(options)
            .await
        {
            Ok(Some(_)) => {
                debug!(lock_id, owner, "lock acquired");
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(err) if is_duplicate_key(&err) => {
                trace!(lock_id, owner, "lost acquisition race to a concurrent upsert");
                Ok(false)
            }
            Err(err) => Err(LockError::from(err)),
        }
    }

    async fn refresh_expiry(&self, lock_id: &str, owner: &str, ttl: Duration) -> Result<bool, LockError> {
        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
        let filter = doc! { "_id": lock_id, "owner": owner };
        let update = doc! { "$set": { "expiryTime": chrono_to_bson(now + ttl) } };
        let result = self
            .collection
            .update_one(filter, update)
            .await
            .map_err(LockError::from)?;
        Ok(result.modified_count > 0)
    }

    async fn release_lock(&self, lock_id: &str, owner: &str) -> Result<(), LockError> {
        self.collection
            .delete_one(doc! { "_id": lock_id, "owner": owner })
            .await
            .map_err(LockError::from)?;
        Ok(())
    }

    async fn is_locked(&self, lock_id: &str, owner: &str) -> Result<bool, LockError> {
        let now = self.clock.now();
        let count = self
            .collection
            .count_documents(doc! {
                "_id": lock_id,
                "owner": owner,
                "expiryTime": { "$gt": chrono_to_bson(now) },
            })
            .await
            .map_err(LockError::from)?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dq_core::SystemClock;
    use mongodb::Client;

    async fn connect() -> MongoLockRepository<SystemClock> {
        let url = std::env::var("DQ_TEST_MONGODB_URL").expect("DQ_TEST_MONGODB_URL must be set");
        let client = Client::with_uri_str(&url).await.unwrap();
        let collection = client.database("dq_parity_tests").collection::<Lock>("locks");
        MongoLockRepository::new(collection, SystemClock)
    }

    #[tokio::test]
    #[ignore = "Requires a MongoDB connection (set DQ_TEST_MONGODB_URL)"]
    async fn parity_acquire_and_release() {
        let repo = connect().await;
        assert!(repo.lock("parity-lock", "owner-a", Duration::from_secs(5)).await.unwrap());
        assert!(repo.is_locked("parity-lock", "owner-a").await.unwrap());
        repo.release_lock("parity-lock", "owner-a").await.unwrap();
        assert!(!repo.is_locked("parity-lock", "owner-a").await.unwrap());
    }

    #[tokio::test]
    #[ignore = "Requires a MongoDB connection (set DQ_TEST_MONGODB_URL)"]
    async fn parity_contended_acquire_loses() {
        let repo = connect().await;
        let id = "parity-contended-lock";
        repo.release_lock(id, "owner-a").await.unwrap();
        assert!(repo.lock(id, "owner-a", Duration::from_secs(5)).await.unwrap());
        assert!(!repo.lock(id, "owner-b", Duration::from_secs(5)).await.unwrap());
        repo.release_lock(id, "owner-a").await.unwrap();
    }
}
