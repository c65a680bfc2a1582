use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{error::Result, presigned_url::PresignedUrl};

/// Named byte blobs. Keys are built with [crate::asset_key] and
/// [crate::staging_key].
#[async_trait]
pub trait AssetStore: Send + Sync + std::fmt::Debug {
    /// Store `bytes` under `key`, replacing any existing object, and return
    /// the key. Backends that record a content type derive it from the key's
    /// extension, see [crate::content_type_for_key].
    async fn put(&self, key: &str, bytes: Bytes) -> Result<String>;

    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Remove the object. Deleting a missing object succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn presign(&self, key: &str, method: http::Method, ttl: Duration) -> Result<PresignedUrl>;
}
