//! MongoDB-backed work-item repository.
//!
//! Every operation here is a direct call into the real `mongodb` driver
//! (`insert_one`, `insert_many`, `find_one_and_update`, `update_one`,
//! `count_documents`, `create_indexes`) rather than a reimplementation of any
//! datastore logic. Field names on the persisted document are taken from
//! [`WorkItemFieldNames`] rather than hard-coded.

use crate::error::WorkItemError;
use crate::model::{is_cancellable, is_result_status, ProcessingStatus, StatusUpdateResult, WorkItem, WorkItemFieldNames};
use crate::traits::WorkItemRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dq_core::Clock;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{FindOneAndUpdateOptions, IndexOptions, ReturnDocument};
use mongodb::{Collection, IndexModel};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use tracing::debug;
use uuid::Uuid;

/// Configuration for the MongoDB work-item backend.
#[derive(Debug, Clone)]
pub struct MongoWorkItemConfig {
    pub field_names: WorkItemFieldNames,
    pub in_progress_retry_after: chrono::Duration,
    /// Create the `(status, updatedAt)`, `(status, availableAt)` and `(status)`
    /// indexes if they don't already exist.
    pub create_indexes_if_missing: bool,
}

impl Default for MongoWorkItemConfig {
    fn default() -> Self {
        Self {
            field_names: WorkItemFieldNames::default(),
            in_progress_retry_after: chrono::Duration::minutes(5),
            create_indexes_if_missing: true,
        }
    }
}

pub struct MongoWorkItemRepository<T, C: Clock> {
    collection: Collection<Document>,
    clock: C,
    config: MongoWorkItemConfig,
    _marker: PhantomData<fn() -> T>,
}

impl<T, C> MongoWorkItemRepository<T, C>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
    C: Clock,
{
    pub async fn new(
        collection: Collection<Document>,
        clock: C,
        config: MongoWorkItemConfig,
    ) -> Result<Self, WorkItemError> {
        let repo = Self {
            collection,
            clock,
            config,
            _marker: PhantomData,
        };
        if repo.config.create_indexes_if_missing {
            repo.ensure_indexes().await?;
        }
        Ok(repo)
    }

    async fn ensure_indexes(&self) -> Result<(), WorkItemError> {
        let f = &self.config.field_names;
        let models = vec![
            IndexModel::builder()
                .keys(doc! { f.status.clone(): 1, f.updated_at.clone(): 1 })
                .build(),
            IndexModel::builder()
                .keys(doc! { f.status.clone(): 1, f.available_at.clone(): 1 })
                .build(),
            IndexModel::builder().keys(doc! { f.status.clone(): 1 }).build(),
            IndexModel::builder()
                .keys(doc! { f.id.clone(): 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
        ];
        self.collection.create_indexes(models).await.map_err(WorkItemError::from)?;
        debug!("work-item indexes ensured");
        Ok(())
    }

    fn encode(&self, work_item: &WorkItem<T>) -> Result<Document, WorkItemError> {
        let f = &self.config.field_names;
        let mut doc = Document::new();
        doc.insert(f.id.clone(), work_item.id.clone());
        doc.insert(f.received_at.clone(), chrono_to_bson(work_item.received_at));
        doc.insert(f.updated_at.clone(), chrono_to_bson(work_item.updated_at));
        doc.insert(f.available_at.clone(), chrono_to_bson(work_item.available_at));
        doc.insert(f.status.clone(), work_item.status.wire_name());
        doc.insert(f.failure_count.clone(), work_item.failure_count as i64);
        doc.insert(f.item.clone(), mongodb::bson::to_bson(&work_item.item)?);
        Ok(doc)
    }

    fn decode(&self, doc: Document) -> Result<WorkItem<T>, WorkItemError> {
        let f = &self.config.field_names;
        let status_str = doc.get_str(&f.status).map_err(|_| {
            WorkItemError::Serialization(<serde_json::Error as serde::de::Error>::custom("missing status field"))
        })?;
        let status = status_from_wire(status_str).ok_or_else(|| {
            WorkItemError::Serialization(<serde_json::Error as serde::de::Error>::custom("unknown status value"))
        })?;
        let item_bson = doc
            .get(&f.item)
            .cloned()
            .unwrap_or(Bson::Null);
        let item: T = mongodb::bson::from_bson(item_bson)?;

        let received_at = required_timestamp(doc.get(&f.received_at), &f.received_at)?;
        let updated_at = required_timestamp(doc.get(&f.updated_at), &f.updated_at)?;
        // A present-but-malformed availableAt is still an error; only its total
        // absence is treated as a legacy record predating the field, defaulting
        // to receivedAt the same way push_new does for newly created items.
        let available_at = match doc.get(&f.available_at) {
            None => received_at,
            some => required_timestamp(some, &f.available_at)?,
        };

        Ok(WorkItem {
            id: doc.get_str(&f.id).unwrap_or_default().to_string(),
            received_at,
            updated_at,
            available_at,
            status,
            failure_count: doc.get_i64(&f.failure_count).unwrap_or(0) as u64,
            item,
        })
    }
}

/// `bson::DateTime`'s `from_chrono`/`to_chrono` helpers require the bson crate's
/// `chrono-0_4` feature; converting through millisecond-since-epoch avoids
/// pulling that feature in just for two call sites.
fn chrono_to_bson(dt: DateTime<Utc>) -> Bson {
    Bson::DateTime(mongodb::bson::DateTime::from_millis(dt.timestamp_millis()))
}

/// Decodes a required timestamp field, raising `WorkItemError::Serialization`
/// rather than defaulting when the field is missing or not a datetime.
fn required_timestamp(value: Option<&Bson>, field: &str) -> Result<DateTime<Utc>, WorkItemError> {
    let field_error = |reason: &str| {
        WorkItemError::Serialization(<serde_json::Error as serde::de::Error>::custom(format!(
            "{field}: {reason}"
        )))
    };
    let bson_dt = value
        .and_then(Bson::as_datetime)
        .ok_or_else(|| field_error("missing or not a datetime"))?;
    DateTime::<Utc>::from_timestamp_millis(bson_dt.timestamp_millis())
        .ok_or_else(|| field_error("out of range"))
}

fn status_from_wire(s: &str) -> Option<ProcessingStatus> {
    Some(match s {
        "todo" => ProcessingStatus::ToDo,
        "in-progress" => ProcessingStatus::InProgress,
        "succeeded" => ProcessingStatus::Succeeded,
        "failed" => ProcessingStatus::Failed,
        "permanently-failed" => ProcessingStatus::PermanentlyFailed,
        "ignored" => ProcessingStatus::Ignored,
        "duplicate" => ProcessingStatus::Duplicate,
        "deferred" => ProcessingStatus::Deferred,
        "cancelled" => ProcessingStatus::Cancelled,
        _ => return None,
    })
}

#[async_trait]
impl<T, C> WorkItemRepository<T> for MongoWorkItemRepository<T, C>
where
    T: Serialize + DeserializeOwned + Send + Sync + Clone + 'static,
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
            id: Uuid::now_v7().to_string(),
            received_at,
            updated_at: self.clock.now(),
            available_at,
            status: initial_status,
            failure_count: 0,
            item,
        };
        let doc = self.encode(&work_item)?;
        self.collection.insert_one(doc).await.map_err(WorkItemError::from)?;
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
        let expected = items.len();
        let mut work_items = Vec::with_capacity(expected);
        let mut docs = Vec::with_capacity(expected);
        for item in items {
            let status = initial_status(&item);
            let work_item = WorkItem {
                id: Uuid::now_v7().to_string(),
                received_at,
                updated_at: now,
                available_at,
                status,
                failure_count: 0,
                item,
            };
            docs.push(self.encode(&work_item)?);
            work_items.push(work_item);
        }

        let result = self.collection.insert_many(docs).await.map_err(WorkItemError::from)?;
        let actual = result.inserted_ids.len();
        if actual != expected {
            return Err(WorkItemError::PartialInsert { expected, actual });
        }
        Ok(work_items)
    }

    async fn pull_outstanding(
        &self,
        failed_before: DateTime<Utc>,
        available_before: DateTime<Utc>,
    ) -> Result<Option<WorkItem<T>>, WorkItemError> {
        let f = &self.config.field_names;
        let now = self.clock.now();
        let stuck_cutoff = now - self.config.in_progress_retry_after;

        let update = doc! {
            "$set": { f.status.clone(): ProcessingStatus::InProgress.wire_name(), f.updated_at.clone(): chrono_to_bson(now) }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let bucket1 = doc! {
            f.status.clone(): { "$in": [ProcessingStatus::ToDo.wire_name(), ProcessingStatus::Deferred.wire_name()] },
            f.available_at.clone(): { "$lt": chrono_to_bson(available_before) },
        };
        if let Some(doc) = self
            .collection
            .find_one_and_update(bucket1, update.clone())
            .with_options(options.clone())
            .await
            .map_err(WorkItemError::from)?
        {
            return Ok(Some(self.decode(doc)?));
        }

        let bucket2 = doc! {
            f.status.clone(): ProcessingStatus::Failed.wire_name(),
            f.updated_at.clone(): { "$lt": chrono_to_bson(failed_before) },
            "$or": [
                { f.available_at.clone(): { "$lt": chrono_to_bson(available_before) } },
                { f.available_at.clone(): { "$exists": false } },
            ],
        };
        if let Some(doc) = self
            .collection
            .find_one_and_update(bucket2, update.clone())
            .with_options(options.clone())
            .await
            .map_err(WorkItemError::from)?
        {
            return Ok(Some(self.decode(doc)?));
        }

        let bucket3 = doc! {
            f.status.clone(): ProcessingStatus::InProgress.wire_name(),
            f.updated_at.clone(): { "$lt": chrono_to_bson(stuck_cutoff) },
        };
        if let Some(doc) = self
            .collection
            .find_one_and_update(bucket3, update)
            .with_options(options)
            .await
            .map_err(WorkItemError::from)?
        {
            return Ok(Some(self.decode(doc)?));
        }

        Ok(None)
    }

    async fn mark_as(
        &self,
        id: &str,
        status: ProcessingStatus,
        available_at: Option<DateTime<Utc>>,
    ) -> Result<bool, WorkItemError> {
        let f = &self.config.field_names;
        let now = self.clock.now();
        let mut set_doc = doc! { f.status.clone(): status.wire_name(), f.updated_at.clone(): chrono_to_bson(now) };
        if let Some(available_at) = available_at {
            set_doc.insert(f.available_at.clone(), chrono_to_bson(available_at));
        }
        let mut update = doc! { "$set": set_doc };
        if status == ProcessingStatus::Failed {
            update.insert("$inc", doc! { f.failure_count.clone(): 1_i64 });
        }
        let result = self
            .collection
            .update_one(doc! { f.id.clone(): id }, update)
            .await
            .map_err(WorkItemError::from)?;
        Ok(result.matched_count > 0)
    }

    async fn complete(&self, id: &str, result_status: ProcessingStatus) -> Result<bool, WorkItemError> {
        if !is_result_status(result_status) {
            return Err(WorkItemError::InvalidResultStatus { status: result_status });
        }
        let f = &self.config.field_names;
        let now = self.clock.now();
        let filter = doc! { f.id.clone(): id, f.status.clone(): ProcessingStatus::InProgress.wire_name() };
        let update = doc! { "$set": { f.status.clone(): result_status.wire_name(), f.updated_at.clone(): chrono_to_bson(now) } };
        let result = self.collection.update_one(filter, update).await.map_err(WorkItemError::from)?;
        Ok(result.modified_count > 0)
    }

    async fn cancel(&self, id: &str) -> Result<StatusUpdateResult, WorkItemError> {
        let f = &self.config.field_names;
        let now = self.clock.now();
        let cancellable_wire: Vec<&'static str> = [
            ProcessingStatus::ToDo,
            ProcessingStatus::Failed,
            ProcessingStatus::InProgress,
            ProcessingStatus::Deferred,
        ]
        .into_iter()
        .filter(|s| is_cancellable(*s))
        .map(ProcessingStatus::wire_name)
        .collect();

        let filter = doc! { f.id.clone(): id, f.status.clone(): { "$in": cancellable_wire } };
        let update = doc! { "$set": { f.status.clone(): ProcessingStatus::Cancelled.wire_name(), f.updated_at.clone(): chrono_to_bson(now) } };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .build();

        if let Some(before) = self
            .collection
            .find_one_and_update(filter, update)
            .with_options(options)
            .await
            .map_err(WorkItemError::from)?
        {
            let previous = self.decode(before)?.status;
            return Ok(StatusUpdateResult::Updated {
                previous,
                new: ProcessingStatus::Cancelled,
            });
        }

        match self.find_by_id(id).await? {
            Some(existing) => Ok(StatusUpdateResult::NotUpdated { current: existing.status }),
            None => Ok(StatusUpdateResult::NotFound),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<WorkItem<T>>, WorkItemError> {
        let f = &self.config.field_names;
        match self
            .collection
            .find_one(doc! { f.id.clone(): id })
            .await
            .map_err(WorkItemError::from)?
        {
            Some(doc) => Ok(Some(self.decode(doc)?)),
            None => Ok(None),
        }
    }

    async fn count(&self, status: ProcessingStatus) -> Result<u64, WorkItemError> {
        let f = &self.config.field_names;
        let count = self
            .collection
            .count_documents(doc! { f.status.clone(): status.wire_name() })
            .await
            .map_err(WorkItemError::from)?;
        Ok(count)
    }
}
