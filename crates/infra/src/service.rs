//! Product usecases: validated writes through the producer, cache-aside reads.
//!
//! Writes never touch the store. Update and delete invalidate the cache entry
//! right after the event is accepted, which races the consumer's own refresh:
//! a read in between can repopulate the cache from a store that has not
//! applied the event yet. That stale entry lives until the consumer's refresh
//! or the TTL replaces it.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shelfline_core::{ErrorKind, ProductId, RequestContext};
use shelfline_events::ProductChange;
use shelfline_products::{
    Product, ProductFilter, ProductInput, ProductSnapshot, ProductValidator, ValidationError,
};

use crate::cache::ProductCache;
use crate::producer::{EventProducer, ProduceError};
use crate::store::{ProductStore, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("product {0} not found")]
    NotFound(ProductId),

    #[error("event could not be sent: {0}")]
    Transport(#[from] ProduceError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Transport(_) => ErrorKind::Transport,
            ServiceError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ServiceError::NotFound(id),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

/// A write that was queued for processing.
///
/// For creates `product_id` is the placeholder; the real id is only known once
/// the consumer applied the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub product_id: ProductId,
    pub event_id: Uuid,
}

pub struct ProductService {
    validator: ProductValidator,
    producer: Arc<EventProducer>,
    store: Arc<dyn ProductStore>,
    cache: Arc<dyn ProductCache>,
}

impl std::fmt::Debug for ProductService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductService")
            .field("producer", &self.producer)
            .finish_non_exhaustive()
    }
}

impl ProductService {
    pub fn new(
        producer: Arc<EventProducer>,
        store: Arc<dyn ProductStore>,
        cache: Arc<dyn ProductCache>,
    ) -> Self {
        Self {
            validator: ProductValidator::new(),
            producer,
            store,
            cache,
        }
    }

    #[instrument(skip_all, fields(request_id = %ctx.request_id()), err)]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        input: &ProductInput,
    ) -> Result<Accepted, ServiceError> {
        let data = self.validator.validate(input, Utc::now())?;
        let snapshot = ProductSnapshot::new(ProductId::UNASSIGNED, data);
        let envelope = self
            .producer
            .send(ctx, ProductChange::Created(snapshot))
            .await?;

        info!(event_id = %envelope.event_id(), "product creation accepted");
        Ok(Accepted {
            product_id: envelope.product_id(),
            event_id: envelope.event_id(),
        })
    }

    #[instrument(skip_all, fields(request_id = %ctx.request_id(), product_id = %id), err)]
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: ProductId,
        input: &ProductInput,
    ) -> Result<Accepted, ServiceError> {
        let data = self.validator.validate(input, Utc::now())?;
        let envelope = self
            .producer
            .send(ctx, ProductChange::Updated(ProductSnapshot::new(id, data)))
            .await?;

        self.invalidate(id).await;
        info!(event_id = %envelope.event_id(), "product update accepted");
        Ok(Accepted {
            product_id: id,
            event_id: envelope.event_id(),
        })
    }

    #[instrument(skip_all, fields(request_id = %ctx.request_id(), product_id = %id), err)]
    pub async fn delete(&self, ctx: &RequestContext, id: ProductId) -> Result<Accepted, ServiceError> {
        let envelope = self.producer.send(ctx, ProductChange::Deleted(id)).await?;

        self.invalidate(id).await;
        info!(event_id = %envelope.event_id(), "product deletion accepted");
        Ok(Accepted {
            product_id: id,
            event_id: envelope.event_id(),
        })
    }

    /// Cache-aside read. A cache error is treated as a miss.
    #[instrument(skip_all, fields(request_id = %ctx.request_id(), product_id = %id), err)]
    pub async fn get(&self, ctx: &RequestContext, id: ProductId) -> Result<Product, ServiceError> {
        match self.cache.get(id).await {
            Ok(Some(product)) => {
                debug!("cache hit");
                return Ok(product);
            }
            Ok(None) => debug!("cache miss"),
            Err(err) => warn!(error = %err, "cache read failed, falling back to store"),
        }

        let product = self.store.get(id).await?;
        if let Err(err) = self.cache.set(&product).await {
            warn!(error = %err, "cache population failed");
        }
        Ok(product)
    }

    /// Lists straight from the store; list results are never cached.
    #[instrument(skip_all, fields(request_id = %ctx.request_id()), err)]
    pub async fn list(
        &self,
        ctx: &RequestContext,
        filter: &ProductFilter,
    ) -> Result<Vec<Product>, ServiceError> {
        Ok(self.store.list(filter).await?)
    }

    async fn invalidate(&self, id: ProductId) {
        if let Err(err) = self.cache.delete(id).await {
            warn!(error = %err, "cache invalidation failed");
        }
    }
}
