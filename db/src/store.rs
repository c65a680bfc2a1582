use async_trait::async_trait;
use thiserror::Error;

use crate::{
    object_id::ImageId,
    record::{ImagePatch, ImageRecord},
};

/// Every record of a deployment lives in this one partition.
pub const PARTITION_KEY: &str = "images";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Metadata store unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Record {0} already exists")]
    Conflict(String),

    #[error("Malformed record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Running migrations: {0}")]
    Migration(String),
}

impl From<deadpool_diesel::PoolError> for StoreError {
    fn from(err: deadpool_diesel::PoolError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<deadpool_diesel::InteractError> for StoreError {
    fn from(err: deadpool_diesel::InteractError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// The backing key-value store for image records. Records are addressed by
/// the composite key `{owner}#{id}` within a single partition.
#[async_trait]
pub trait MetadataStore: Send + Sync + std::fmt::Debug {
    /// Insert a new record. Fails with `Conflict` if the key is taken.
    async fn insert(&self, record: &ImageRecord) -> Result<(), StoreError>;

    async fn get(&self, owner: &str, id: &ImageId) -> Result<Option<ImageRecord>, StoreError>;

    /// Look up a record by id alone, whoever owns it.
    async fn find(&self, id: &ImageId) -> Result<Option<ImageRecord>, StoreError>;

    /// All records, or all records of one owner, in insertion order.
    async fn scan(&self, owner: Option<&str>) -> Result<Vec<ImageRecord>, StoreError>;

    /// Apply `patch` to the stored record in one step, so concurrent patches
    /// of different fields never undo each other. Returns the updated record,
    /// or None if there was nothing to update.
    async fn update(
        &self,
        owner: &str,
        id: &ImageId,
        patch: &ImagePatch,
    ) -> Result<Option<ImageRecord>, StoreError>;

    /// Remove a record, returning it if it existed.
    async fn delete(&self, owner: &str, id: &ImageId) -> Result<Option<ImageRecord>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
