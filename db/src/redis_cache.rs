use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use tracing::{event, Level};

use crate::cache::{CacheBackend, CacheError, KEY_NAMESPACE};

/// Glob matching every key in the service's namespace.
fn namespace_pattern() -> String {
    format!("{KEY_NAMESPACE}*")
}

/// Keys per DEL command when clearing.
const DELETE_BATCH: usize = 500;

/// Cache entries stored in Redis, so that every instance of the service
/// shares them. Redis expires entries by itself.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
    url: String,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").field("url", &self.url).finish()
    }
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        event!(Level::INFO, %url, "connecting to redis");
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(RedisCache {
            connection,
            url: url.to_string(),
        })
    }

    /// Every key in the namespace, collected with SCAN.
    async fn namespace_keys(&self) -> Result<Vec<String>, CacheError> {
        let mut conn = self.connection.clone();
        let mut iter = conn.scan_match::<_, String>(namespace_pattern()).await?;

        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }

        Ok(keys)
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(CacheError::Unavailable(format!(
                "unexpected PING response {pong}"
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let _: u64 = conn.del(key).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<u64, CacheError> {
        let keys = self.namespace_keys().await?;
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection.clone();
        let mut deleted = 0;
        for batch in keys.chunks(DELETE_BATCH) {
            let n: u64 = conn.del(batch).await?;
            deleted += n;
        }

        Ok(deleted)
    }

    async fn len(&self) -> Result<u64, CacheError> {
        Ok(self.namespace_keys().await?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_covers_every_cache_key() {
        let pattern = namespace_pattern();
        let prefix = pattern.trim_end_matches('*');
        assert_eq!(pattern, "visuasort:*");
        for key in [
            crate::CacheKey::Listing("alice").to_string(),
            crate::CacheKey::Tags("bob").to_string(),
        ] {
            assert!(key.starts_with(prefix));
        }
    }
}
