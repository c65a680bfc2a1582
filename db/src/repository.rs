use std::{collections::BTreeSet, sync::Arc};

use chrono::{DateTime, Utc};
use tracing::{event, instrument, Level};

use crate::{
    cache::{CacheKey, Generation, ReadThroughCache},
    object_id::ImageId,
    query::{matches_search, FilterSet, Page, PageRequest},
    record::{ImagePatch, ImageRecord},
    store::{MetadataStore, StoreError},
};

/// Image records with an optional read-through cache in front of the store.
///
/// Reads consult the cache first and fill it on a miss. Every mutation
/// invalidates the owner's listing and tag set, and the record's own entry,
/// before it returns, and a read that raced a mutation does not fill. The
/// cache never fails an operation; the store does.
#[derive(Clone, Debug)]
pub struct ImageRepository {
    store: Arc<dyn MetadataStore>,
    cache: Option<ReadThroughCache>,
}

impl ImageRepository {
    pub fn new(store: Arc<dyn MetadataStore>, cache: Option<ReadThroughCache>) -> Self {
        ImageRepository { store, cache }
    }

    pub fn cache(&self) -> Option<&ReadThroughCache> {
        self.cache.as_ref()
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }

    async fn invalidate(&self, owner: &str, id: &ImageId) {
        if let Some(cache) = &self.cache {
            cache
                .invalidate_all(&[
                    CacheKey::Listing(owner),
                    CacheKey::Tags(owner),
                    CacheKey::Image { owner, id },
                ])
                .await;
        }
    }

    /// Cache generation to fill with, taken before a store read.
    async fn generation(&self) -> Option<Generation> {
        match &self.cache {
            Some(cache) => Some(cache.generation().await),
            None => None,
        }
    }

    async fn fill<T: serde::Serialize + ?Sized>(
        &self,
        generation: Option<Generation>,
        key: CacheKey<'_>,
        value: &T,
    ) {
        if let (Some(cache), Some(generation)) = (&self.cache, generation) {
            cache.fill(generation, key, value).await;
        }
    }

    /// All of an owner's records in insertion order.
    async fn owner_records(&self, owner: &str) -> Result<Vec<ImageRecord>, StoreError> {
        if let Some(cache) = &self.cache {
            if let Some(records) = cache.get(CacheKey::Listing(owner)).await {
                return Ok(records);
            }
        }

        let generation = self.generation().await;
        let records = self.store.scan(Some(owner)).await?;
        self.fill(generation, CacheKey::Listing(owner), &records).await;
        Ok(records)
    }

    #[instrument(skip_all, fields(owner = %record.owner, id = %record.id))]
    pub async fn create(&self, record: ImageRecord) -> Result<ImageRecord, StoreError> {
        self.store.insert(&record).await?;
        self.invalidate(&record.owner, &record.id).await;
        let generation = self.generation().await;
        self.fill(
            generation,
            CacheKey::Image {
                owner: &record.owner,
                id: &record.id,
            },
            &record,
        )
        .await;

        event!(Level::INFO, "created image record");
        Ok(record)
    }

    pub async fn get_by_id(
        &self,
        owner: &str,
        id: &ImageId,
    ) -> Result<Option<ImageRecord>, StoreError> {
        let key = CacheKey::Image { owner, id };
        if let Some(cache) = &self.cache {
            if let Some(record) = cache.get(key).await {
                return Ok(Some(record));
            }
        }

        let generation = self.generation().await;
        let record = self.store.get(owner, id).await?;
        if let Some(record) = &record {
            self.fill(generation, key, record).await;
        }

        Ok(record)
    }

    /// Find a record by id whoever owns it. Always reads the store.
    pub async fn locate(&self, id: &ImageId) -> Result<Option<ImageRecord>, StoreError> {
        self.store.find(id).await
    }

    pub async fn list_by_owner(
        &self,
        owner: &str,
        request: &PageRequest,
    ) -> Result<Page<ImageRecord>, StoreError> {
        let records = self.owner_records(owner).await?;
        Ok(request.apply(records))
    }

    /// Apply `patch` to a record. Returns None if the record does not exist.
    #[instrument(skip(self, patch))]
    pub async fn update(
        &self,
        owner: &str,
        id: &ImageId,
        patch: ImagePatch,
    ) -> Result<Option<ImageRecord>, StoreError> {
        let updated = self.store.update(owner, id, &patch).await?;
        if updated.is_some() {
            self.invalidate(owner, id).await;
        }

        Ok(updated)
    }

    pub async fn update_tags(
        &self,
        owner: &str,
        id: &ImageId,
        tags: Vec<String>,
    ) -> Result<Option<ImageRecord>, StoreError> {
        self.update(owner, id, ImagePatch::tags(tags)).await
    }

    /// Remove a record, returning it if it existed. Deleting a missing record
    /// is not an error.
    #[instrument(skip(self))]
    pub async fn delete(
        &self,
        owner: &str,
        id: &ImageId,
    ) -> Result<Option<ImageRecord>, StoreError> {
        let removed = self.store.delete(owner, id).await?;
        self.invalidate(owner, id).await;
        Ok(removed)
    }

    pub async fn search(
        &self,
        owner: &str,
        query: &str,
        request: &PageRequest,
    ) -> Result<Page<ImageRecord>, StoreError> {
        let records = self
            .owner_records(owner)
            .await?
            .into_iter()
            .filter(|r| matches_search(r, query))
            .collect();
        Ok(request.apply(records))
    }

    /// Filter records. With `scope` set only that owner's records are
    /// considered; `None` widens the search to every owner.
    pub async fn filter(
        &self,
        scope: Option<&str>,
        filters: &FilterSet,
        request: &PageRequest,
    ) -> Result<Page<ImageRecord>, StoreError> {
        self.filter_at(scope, filters, request, Utc::now()).await
    }

    async fn filter_at(
        &self,
        scope: Option<&str>,
        filters: &FilterSet,
        request: &PageRequest,
        now: DateTime<Utc>,
    ) -> Result<Page<ImageRecord>, StoreError> {
        let records = match scope {
            Some(owner) => self.owner_records(owner).await?,
            None => self.store.scan(None).await?,
        };

        let records = records
            .into_iter()
            .filter(|r| filters.matches(r, now))
            .collect();
        Ok(request.apply(records))
    }

    /// Whether any of the owner's records still uses `original_key`. Records
    /// created by re-enhancing an image share their source's original.
    pub async fn original_in_use(&self, owner: &str, original_key: &str) -> Result<bool, StoreError> {
        Ok(self
            .owner_records(owner)
            .await?
            .iter()
            .any(|r| r.original_key == original_key))
    }

    /// Every owner's records.
    pub async fn list_all(&self, request: &PageRequest) -> Result<Page<ImageRecord>, StoreError> {
        let records = self.store.scan(None).await?;
        Ok(request.apply(records))
    }

    /// The owner's tags, trimmed, lowercased, deduplicated and sorted.
    pub async fn distinct_tags(&self, owner: &str) -> Result<Vec<String>, StoreError> {
        if let Some(cache) = &self.cache {
            if let Some(tags) = cache.get(CacheKey::Tags(owner)).await {
                return Ok(tags);
            }
        }

        let generation = self.generation().await;
        let tags = self
            .owner_records(owner)
            .await?
            .iter()
            .flat_map(|r| r.tags.iter())
            .map(|tag| tag.trim().to_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();

        self.fill(generation, CacheKey::Tags(owner), &tags).await;
        Ok(tags)
    }
}
