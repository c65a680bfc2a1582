use async_trait::async_trait;
use diesel::{
    prelude::*,
    result::{DatabaseErrorKind, Error as DieselError},
};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness};
use tracing::instrument;

use crate::{
    object_id::ImageId,
    record::{sort_key, ImagePatch, ImageRecord},
    schema::image_records,
    store::{MetadataStore, StoreError, PARTITION_KEY},
    Pool, PoolExt,
};

pub const MIGRATIONS: EmbeddedMigrations = diesel_migrations::embed_migrations!();

#[derive(Debug, Insertable)]
#[diesel(table_name = image_records)]
struct NewImageRow {
    partition_key: String,
    sort_key: String,
    owner: String,
    image_id: String,
    data: serde_json::Value,
}

fn decode(data: Option<serde_json::Value>) -> Result<Option<ImageRecord>, StoreError> {
    data.map(serde_json::from_value)
        .transpose()
        .map_err(StoreError::from)
}

/// Records stored as JSON documents in Postgres, keyed the same way as in a
/// key-value store: one partition, and `{owner}#{id}` as the sort key.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore")
            .field("status", &self.pool.status())
            .finish()
    }
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        PgStore { pool }
    }

    pub fn connect(url: &str, max_connections: usize) -> Result<Self, StoreError> {
        let pool = crate::connect(url, max_connections)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self::new(pool))
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        self.pool
            .interact(|conn| {
                conn.run_pending_migrations(MIGRATIONS)
                    .map(|_| ())
                    .map_err(|e| StoreError::Migration(e.to_string()))
            })
            .await
    }
}

#[async_trait]
impl MetadataStore for PgStore {
    #[instrument(skip_all, fields(owner = %record.owner, id = %record.id))]
    async fn insert(&self, record: &ImageRecord) -> Result<(), StoreError> {
        let key = record.sort_key();
        let row = NewImageRow {
            partition_key: PARTITION_KEY.to_string(),
            sort_key: key.clone(),
            owner: record.owner.clone(),
            image_id: record.id.to_string(),
            data: serde_json::to_value(record)?,
        };

        self.pool
            .interact(move |conn| {
                diesel::insert_into(image_records::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(|e| match e {
                        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                            StoreError::Conflict(key)
                        }
                        e => StoreError::Query(e),
                    })?;
                Ok(())
            })
            .await
    }

    async fn get(&self, owner: &str, id: &ImageId) -> Result<Option<ImageRecord>, StoreError> {
        let key = sort_key(owner, id);
        let data = self
            .pool
            .interact(move |conn| {
                image_records::table
                    .filter(image_records::partition_key.eq(PARTITION_KEY))
                    .filter(image_records::sort_key.eq(key))
                    .select(image_records::data)
                    .first::<serde_json::Value>(conn)
                    .optional()
                    .map_err(StoreError::from)
            })
            .await?;

        decode(data)
    }

    async fn find(&self, id: &ImageId) -> Result<Option<ImageRecord>, StoreError> {
        let id = id.to_string();
        let data = self
            .pool
            .interact(move |conn| {
                image_records::table
                    .filter(image_records::partition_key.eq(PARTITION_KEY))
                    .filter(image_records::image_id.eq(id))
                    .select(image_records::data)
                    .first::<serde_json::Value>(conn)
                    .optional()
                    .map_err(StoreError::from)
            })
            .await?;

        decode(data)
    }

    #[instrument(skip(self))]
    async fn scan(&self, owner: Option<&str>) -> Result<Vec<ImageRecord>, StoreError> {
        let owner = owner.map(String::from);
        let rows = self
            .pool
            .interact(move |conn| {
                let mut query = image_records::table
                    .filter(image_records::partition_key.eq(PARTITION_KEY))
                    .select(image_records::data)
                    .order_by(image_records::seq)
                    .into_boxed();

                if let Some(owner) = owner {
                    query = query.filter(image_records::owner.eq(owner));
                }

                query
                    .load::<serde_json::Value>(conn)
                    .map_err(StoreError::from)
            })
            .await?;

        rows.into_iter()
            .map(|data| serde_json::from_value(data).map_err(StoreError::from))
            .collect()
    }

    #[instrument(skip(self, patch))]
    async fn update(
        &self,
        owner: &str,
        id: &ImageId,
        patch: &ImagePatch,
    ) -> Result<Option<ImageRecord>, StoreError> {
        let key = sort_key(owner, id);
        let patch = patch.clone();
        self.pool
            .transaction(move |conn| {
                let data = image_records::table
                    .filter(image_records::partition_key.eq(PARTITION_KEY))
                    .filter(image_records::sort_key.eq(&key))
                    .select(image_records::data)
                    .for_update()
                    .first::<serde_json::Value>(conn)
                    .optional()?;

                let Some(mut record) = decode(data)? else {
                    return Ok(None);
                };

                record.apply(patch);
                diesel::update(image_records::table)
                    .filter(image_records::partition_key.eq(PARTITION_KEY))
                    .filter(image_records::sort_key.eq(&key))
                    .set((
                        image_records::data.eq(serde_json::to_value(&record)?),
                        image_records::updated.eq(diesel::dsl::now),
                    ))
                    .execute(conn)?;

                Ok(Some(record))
            })
            .await
    }

    async fn delete(&self, owner: &str, id: &ImageId) -> Result<Option<ImageRecord>, StoreError> {
        let key = sort_key(owner, id);
        let data = self
            .pool
            .interact(move |conn| {
                diesel::delete(image_records::table)
                    .filter(image_records::partition_key.eq(PARTITION_KEY))
                    .filter(image_records::sort_key.eq(key))
                    .returning(image_records::data)
                    .get_result::<serde_json::Value>(conn)
                    .optional()
                    .map_err(StoreError::from)
            })
            .await?;

        decode(data)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.pool
            .interact(|conn| {
                diesel::sql_query("SELECT 1")
                    .execute(conn)
                    .map(|_| ())
                    .map_err(StoreError::from)
            })
            .await
    }
}

#[cfg(all(test, feature = "test-postgres"))]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{record::test_util::record, test::run_database_test};

    #[tokio::test(flavor = "multi_thread")]
    async fn round_trip() {
        run_database_test(|database| async move {
            let store = PgStore::new(database.pool.clone());
            let a = record("alice", "a.jpg", 10, Utc::now());
            let b = record("alice", "b.jpg", 20, Utc::now());
            store.insert(&a).await?;
            store.insert(&b).await?;
            assert!(matches!(store.insert(&a).await, Err(StoreError::Conflict(_))));

            assert_eq!(store.get("alice", &a.id).await?, Some(a.clone()));
            assert_eq!(store.find(&b.id).await?, Some(b.clone()));
            assert_eq!(store.scan(Some("alice")).await?, vec![a.clone(), b.clone()]);
            assert!(store.scan(Some("bob")).await?.is_empty());

            let mut changed = a.clone();
            changed.tags = vec!["sea".to_string()];
            let patch = ImagePatch::tags(vec!["sea".to_string()]);
            assert_eq!(store.update("alice", &a.id, &patch).await?, Some(changed.clone()));
            assert_eq!(store.get("alice", &a.id).await?, Some(changed));
            assert_eq!(store.update("bob", &a.id, &patch).await?, None);

            assert!(store.delete("alice", &a.id).await?.is_some());
            assert!(store.delete("alice", &a.id).await?.is_none());
            Ok(())
        })
        .await;
    }
}
