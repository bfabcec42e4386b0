//! In-memory lock repository.
//!
//! Grounded in the same `Arc<RwLock<HashMap<..>>>` shape as
//! `InMemoryTaskStorage`/`InMemorySessionStorage`: a single critical section per
//! operation stands in for the datastore's per-document atomicity.

use crate::error::LockError;
use crate::model::Lock;
use crate::traits::LockRepository;
use async_trait::async_trait;
use dq_core::Clock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

pub struct InMemoryLockRepository<C: Clock> {
    locks: Arc<RwLock<HashMap<String, Lock>>>,
    clock: C,
}

impl<C: Clock> InMemoryLockRepository<C> {
    pub fn new(clock: C) -> Self {
        Self {
            locks: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }
}

fn chrono_duration(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero())
}

#[async_trait]
impl<C: Clock> LockRepository for InMemoryLockRepository<C> {
    async fn lock(&self, lock_id: &str, owner: &str, ttl: Duration) -> Result<bool, LockError> {
        let now = self.clock.now();
        let mut locks = self.locks.write().await;
        let free = match locks.get(lock_id) {
            None => true,
            Some(existing) => now >= existing.expiry_time,
        };
        if !free {
            return Ok(false);
        }
        locks.insert(
            lock_id.to_string(),
            Lock {
                id: lock_id.to_string(),
                owner: owner.to_string(),
                time_created: now,
                expiry_time: now + chrono_duration(ttl),
            },
        );
        Ok(true)
    }

    async fn refresh_expiry(&self, lock_id: &str, owner: &str, ttl: Duration) -> Result<bool, LockError> {
        let now = self.clock.now();
        let mut locks = self.locks.write().await;
        match locks.get_mut(lock_id) {
            Some(existing) if existing.owner == owner => {
                existing.expiry_time = now + chrono_duration(ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_lock(&self, lock_id: &str, owner: &str) -> Result<(), LockError> {
        let mut locks = self.locks.write().await;
        if let Some(existing) = locks.get(lock_id) {
            if existing.owner == owner {
                locks.remove(lock_id);
            }
        }
        Ok(())
    }

    async fn is_locked(&self, lock_id: &str, owner: &str) -> Result<bool, LockError> {
        let now = self.clock.now();
        let locks = self.locks.read().await;
        Ok(locks
            .get(lock_id)
            .map(|existing| existing.is_held_by(owner, now))
            .unwrap_or(false))
    }
}
