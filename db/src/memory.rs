use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    object_id::ImageId,
    record::{ImagePatch, ImageRecord},
    store::{MetadataStore, StoreError},
};

/// A metadata store held in process memory. Used when no database is
/// configured, and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<ImageRecord>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `Unavailable`, to simulate an outage.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn insert(&self, record: &ImageRecord) -> Result<(), StoreError> {
        self.check()?;
        let mut records = self.records.write().await;
        if records
            .iter()
            .any(|r| r.owner == record.owner && r.id == record.id)
        {
            return Err(StoreError::Conflict(record.sort_key()));
        }

        records.push(record.clone());
        Ok(())
    }

    async fn get(&self, owner: &str, id: &ImageId) -> Result<Option<ImageRecord>, StoreError> {
        self.check()?;
        let records = self.records.read().await;
        Ok(records
            .iter()
            .find(|r| r.owner == owner && &r.id == id)
            .cloned())
    }

    async fn find(&self, id: &ImageId) -> Result<Option<ImageRecord>, StoreError> {
        self.check()?;
        let records = self.records.read().await;
        Ok(records.iter().find(|r| &r.id == id).cloned())
    }

    async fn scan(&self, owner: Option<&str>) -> Result<Vec<ImageRecord>, StoreError> {
        self.check()?;
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| owner.map(|o| r.owner == o).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn update(
        &self,
        owner: &str,
        id: &ImageId,
        patch: &ImagePatch,
    ) -> Result<Option<ImageRecord>, StoreError> {
        self.check()?;
        let mut records = self.records.write().await;
        Ok(records
            .iter_mut()
            .find(|r| r.owner == owner && &r.id == id)
            .map(|existing| {
                existing.apply(patch.clone());
                existing.clone()
            }))
    }

    async fn delete(&self, owner: &str, id: &ImageId) -> Result<Option<ImageRecord>, StoreError> {
        self.check()?;
        let mut records = self.records.write().await;
        let position = records.iter().position(|r| r.owner == owner && &r.id == id);
        Ok(position.map(|i| records.remove(i)))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }
}
