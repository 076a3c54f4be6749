//! Redis-backed product cache (`product:{id}` → entity JSON, `SET PX`).

use std::time::Duration;

use async_trait::async_trait;
use redis::IntoConnectionInfo;
use redis::aio::ConnectionManager;
use tracing::instrument;

use shelfline_core::ProductId;
use shelfline_products::Product;

use super::{CacheError, ProductCache, cache_key};

#[derive(Clone)]
pub struct RedisProductCache {
    conn: ConnectionManager,
    ttl: Duration,
}

impl std::fmt::Debug for RedisProductCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisProductCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl RedisProductCache {
    pub async fn connect(
        info: impl IntoConnectionInfo,
        ttl: Duration,
    ) -> Result<Self, CacheError> {
        let client = redis::Client::open(info).map_err(backend)?;
        let conn = ConnectionManager::new(client).await.map_err(backend)?;
        Ok(Self { conn, ttl })
    }

    fn ttl_millis(&self) -> u64 {
        u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX).max(1)
    }
}

fn backend(err: redis::RedisError) -> CacheError {
    CacheError::Backend(err.to_string())
}

#[async_trait]
impl ProductCache for RedisProductCache {
    #[instrument(skip(self), fields(product_id = %id))]
    async fn get(&self, id: ProductId) -> Result<Option<Product>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(cache_key(id))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        raw.map(|json| {
            serde_json::from_str(&json).map_err(|e| CacheError::Decode(e.to_string()))
        })
        .transpose()
    }

    #[instrument(skip(self, product), fields(product_id = %product.id))]
    async fn set(&self, product: &Product) -> Result<(), CacheError> {
        let json = serde_json::to_string(product).map_err(|e| CacheError::Decode(e.to_string()))?;
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(cache_key(product.id))
            .arg(json)
            .arg("PX")
            .arg(self.ttl_millis())
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(backend)
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn delete(&self, id: ProductId) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(cache_key(id))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(backend)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(backend)
    }
}
