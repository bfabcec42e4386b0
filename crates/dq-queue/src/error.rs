//! Error taxonomy for the work-item repository.
//!
//! Absence (`None`) and state-mismatch (`false`, [`crate::StatusUpdateResult`])
//! are expected outcomes in a concurrent queue and are never represented as
//! errors here — only infrastructure failures and caller misuse are.

use crate::model::ProcessingStatus;

#[derive(Debug, thiserror::Error)]
pub enum WorkItemError {
    /// The datastore acknowledged fewer inserts than items supplied to a batch push.
    #[error("partial insert: expected {expected} documents, datastore acknowledged {actual}")]
    PartialInsert { expected: usize, actual: usize },

    /// `complete()` was called with a status that is not a member of the
    /// result-status classifier. Validated explicitly rather than leaning on
    /// subtype refinement.
    #[error("{status:?} is not a valid result status for complete()")]
    InvalidResultStatus { status: ProcessingStatus },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "mongodb")]
    #[error("datastore error: {0}")]
    Datastore(#[from] mongodb::error::Error),

    #[cfg(feature = "mongodb")]
    #[error("bson serialization error: {0}")]
    BsonSerialize(#[from] mongodb::bson::ser::Error),

    #[cfg(feature = "mongodb")]
    #[error("bson deserialization error: {0}")]
    BsonDeserialize(#[from] mongodb::bson::de::Error),
}
