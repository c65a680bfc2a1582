#[macro_use]
extern crate diesel;

mod schema;

pub mod cache;
pub mod memory;
pub mod object_id;
pub mod pg;
pub mod query;
pub mod record;
pub mod redis_cache;
pub mod repository;
pub mod store;
#[cfg(feature = "test-postgres")]
pub mod test;

pub use cache::{
    CacheBackend, CacheError, CacheKey, CacheStats, CacheTtls, Generation, MemoryCache,
    ReadThroughCache,
};
pub use memory::MemoryStore;
pub use object_id::{ImageId, ObjectIdError, StagingId};
pub use pg::PgStore;
pub use query::{DateRange, FilterSet, Page, PageRequest, Pagination, SizeRange, SortField, SortOrder};
pub use record::{ImagePatch, ImageRecord};
pub use redis_cache::RedisCache;
pub use repository::ImageRepository;
pub use store::{MetadataStore, StoreError};

use async_trait::async_trait;
use diesel::{Connection, PgConnection};

pub type Pool = deadpool_diesel::postgres::Pool;

pub fn connect(conn_str: &str, max_connections: usize) -> Result<Pool, impl std::error::Error> {
    let manager =
        deadpool_diesel::postgres::Manager::new(conn_str, deadpool_diesel::Runtime::Tokio1);
    deadpool_diesel::Pool::builder(manager)
        .max_size(max_connections)
        .build()
}

pub fn new_uuid() -> uuid::Uuid {
    ulid::Ulid::new().into()
}

/// Run blocking diesel code on a pooled connection.
#[async_trait]
pub trait PoolExt<F, RETVAL>
where
    F: (FnOnce(&mut PgConnection) -> Result<RETVAL, StoreError>) + Send + 'static,
    RETVAL: Send + 'static,
{
    async fn interact(&self, f: F) -> Result<RETVAL, StoreError>;
    async fn transaction(&self, f: F) -> Result<RETVAL, StoreError>;
}

#[async_trait]
impl<F, RETVAL> PoolExt<F, RETVAL> for Pool
where
    F: (FnOnce(&mut PgConnection) -> Result<RETVAL, StoreError>) + Send + 'static,
    RETVAL: Send + 'static,
{
    async fn interact(&self, f: F) -> Result<RETVAL, StoreError> {
        let conn = self.get().await?;
        conn.interact(move |conn| f(conn)).await?
    }

    async fn transaction(&self, f: F) -> Result<RETVAL, StoreError> {
        let conn = self.get().await?;
        conn.interact(move |conn| conn.transaction(move |conn| f(conn)))
            .await?
    }
}
