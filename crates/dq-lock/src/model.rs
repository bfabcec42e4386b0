//! `Lock` record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named mutual-exclusion record bounded by a TTL.
///
/// A lock is held by `owner` iff a record with that `id` and `owner` exists and
/// `now < expiry_time`. Advisory only: cooperating callers respect it voluntarily,
/// there is no fencing against a holder that keeps writing after its lease lapsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    #[serde(rename = "_id")]
    pub id: String,
    pub owner: String,
    #[serde(rename = "timeCreated")]
    pub time_created: DateTime<Utc>,
    #[serde(rename = "expiryTime")]
    pub expiry_time: DateTime<Utc>,
}

impl Lock {
    pub fn is_held_by(&self, owner: &str, now: DateTime<Utc>) -> bool {
        self.owner == owner && now < self.expiry_time
    }
}
