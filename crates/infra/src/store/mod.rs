//! Durable product storage.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use shelfline_core::ProductId;
use shelfline_products::{Product, ProductData, ProductFilter};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryProductStore;
pub use postgres::{PostgresProductStore, connect_postgres};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("product {0} not found")]
    NotFound(ProductId),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("stored product could not be decoded: {0}")]
    Decode(String),
}

/// CRUD contract of the durable store.
///
/// The store assigns ids and both timestamps. `update` and `delete` report
/// [`StoreError::NotFound`] when no row matched.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn create(&self, data: &ProductData) -> Result<Product, StoreError>;

    async fn get(&self, id: ProductId) -> Result<Product, StoreError>;

    /// Replaces the content of an existing row and refreshes `updated_at`.
    async fn update(&self, id: ProductId, data: &ProductData) -> Result<Product, StoreError>;

    async fn delete(&self, id: ProductId) -> Result<(), StoreError>;

    /// Newest first, then `offset`/`limit`.
    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> ProductStore for Arc<S>
where
    S: ProductStore + ?Sized,
{
    async fn create(&self, data: &ProductData) -> Result<Product, StoreError> {
        (**self).create(data).await
    }

    async fn get(&self, id: ProductId) -> Result<Product, StoreError> {
        (**self).get(id).await
    }

    async fn update(&self, id: ProductId, data: &ProductData) -> Result<Product, StoreError> {
        (**self).update(id, data).await
    }

    async fn delete(&self, id: ProductId) -> Result<(), StoreError> {
        (**self).delete(id).await
    }

    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        (**self).list(filter).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        (**self).ping().await
    }
}
