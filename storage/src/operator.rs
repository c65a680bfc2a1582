use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{path::Path, signer::Signer, ObjectStore};
use tracing::{event, instrument, Level};

use crate::{
    asset_store::AssetStore,
    error::{Error, Result},
    presigned_url::PresignedUrl,
};

/// An [AssetStore] backed by an `object_store` implementation.
pub struct Operator {
    pub store: Arc<dyn ObjectStore>,
    /// Set when the backend can issue presigned URLs.
    pub signer: Option<Arc<dyn Signer>>,
    pub path_prefix: Option<Path>,
}

impl std::fmt::Debug for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operator")
            .field("store", &self.store.to_string())
            .field("presign", &self.signer.is_some())
            .field("path_prefix", &self.path_prefix)
            .finish()
    }
}

impl Operator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Operator {
            store,
            signer: None,
            path_prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: Option<Path>) -> Self {
        self.path_prefix = prefix;
        self
    }

    fn make_full_path(&self, location: &str) -> Result<Path> {
        let path = Path::parse(location).map_err(|_| Error::InvalidKey(location.to_string()))?;
        Ok(match &self.path_prefix {
            Some(prefix) => prefix.parts().chain(path.parts()).collect(),
            None => path,
        })
    }
}

#[async_trait]
impl AssetStore for Operator {
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    async fn put(&self, key: &str, bytes: Bytes) -> Result<String> {
        let p = self.make_full_path(key)?;
        self.store.put(&p, bytes).await?;
        Ok(key.to_string())
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Bytes> {
        let p = self.make_full_path(key)?;
        let result = self.store.get(&p).await?;
        Ok(result.bytes().await?)
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<()> {
        let p = self.make_full_path(key)?;
        match self.store.delete(&p).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => {
                event!(Level::DEBUG, %key, "object already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn presign(&self, key: &str, method: http::Method, ttl: Duration) -> Result<PresignedUrl> {
        let signer = self.signer.as_ref().ok_or(Error::PresignedUrlNotSupported)?;
        let p = self.make_full_path(key)?;
        let url = signer.signed_url(method.clone(), &p, ttl).await?;
        Ok(PresignedUrl::new(method, url.to_string(), ttl))
    }
}

#[cfg(test)]
mod tests {
    use object_store::memory::InMemory;

    use super::*;

    fn memory_operator() -> Operator {
        Operator::new(Arc::new(InMemory::new()))
    }

    #[tokio::test]
    async fn put_get_delete() {
        let op = memory_operator();
        let key = op
            .put("alice/img1-original.png", Bytes::from_static(b"abc"))
            .await
            .unwrap();
        assert_eq!(key, "alice/img1-original.png");

        let data = op.get(&key).await.unwrap();
        assert_eq!(data.as_ref(), b"abc");

        op.delete(&key).await.unwrap();
        let err = op.get(&key).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let op = memory_operator();
        op.delete("nobody/nothing.jpg").await.unwrap();
        op.delete("nobody/nothing.jpg").await.unwrap();
    }

    #[tokio::test]
    async fn prefix_is_applied() {
        let store = Arc::new(InMemory::new());
        let op = Operator::new(store.clone()).with_prefix(Some(Path::from("gallery")));
        op.put("bob/x-web.webp", Bytes::from_static(b"1"))
            .await
            .unwrap();

        let raw = store
            .get(&Path::from("gallery/bob/x-web.webp"))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(raw.as_ref(), b"1");
    }

    #[tokio::test]
    async fn memory_cannot_presign() {
        let op = memory_operator();
        let err = op
            .presign("a/b.jpg", http::Method::GET, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PresignedUrlNotSupported));
    }

    #[tokio::test]
    async fn rejects_bad_keys() {
        let op = memory_operator();
        let err = op
            .put("a//b", Bytes::from_static(b"1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
    }
}
