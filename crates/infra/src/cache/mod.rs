//! Read-through cache for single products.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use shelfline_core::ProductId;
use shelfline_products::Product;

pub mod in_memory;
pub mod redis;

pub use in_memory::InMemoryProductCache;
pub use redis::RedisProductCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cached value could not be decoded: {0}")]
    Decode(String),
}

/// Cache key for one product.
pub fn cache_key(id: ProductId) -> String {
    format!("product:{id}")
}

/// Best-effort product cache. Entries expire after the implementation's TTL.
#[async_trait]
pub trait ProductCache: Send + Sync {
    async fn get(&self, id: ProductId) -> Result<Option<Product>, CacheError>;

    async fn set(&self, product: &Product) -> Result<(), CacheError>;

    async fn delete(&self, id: ProductId) -> Result<(), CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}

#[async_trait]
impl<C> ProductCache for Arc<C>
where
    C: ProductCache + ?Sized,
{
    async fn get(&self, id: ProductId) -> Result<Option<Product>, CacheError> {
        (**self).get(id).await
    }

    async fn set(&self, product: &Product) -> Result<(), CacheError> {
        (**self).set(product).await
    }

    async fn delete(&self, id: ProductId) -> Result<(), CacheError> {
        (**self).delete(id).await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        (**self).ping().await
    }
}
