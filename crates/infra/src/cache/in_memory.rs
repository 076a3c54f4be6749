use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use shelfline_core::ProductId;
use shelfline_products::Product;

use super::{CacheError, ProductCache};

/// In-memory TTL cache for tests/dev.
///
/// Expiry uses tokio's clock, so paused-time tests can advance past the TTL.
#[derive(Debug)]
pub struct InMemoryProductCache {
    ttl: Duration,
    entries: Mutex<HashMap<ProductId, (Product, Instant)>>,
    failing: AtomicBool,
}

impl InMemoryProductCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Every call fails with a backend error while set.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CacheError::Backend("cache unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

fn poisoned() -> CacheError {
    CacheError::Backend("cache lock poisoned".to_string())
}

#[async_trait]
impl ProductCache for InMemoryProductCache {
    async fn get(&self, id: ProductId) -> Result<Option<Product>, CacheError> {
        self.check()?;
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        match entries.get(&id) {
            Some((product, expires_at)) if Instant::now() < *expires_at => {
                Ok(Some(product.clone()))
            }
            Some(_) => {
                entries.remove(&id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, product: &Product) -> Result<(), CacheError> {
        self.check()?;
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        entries.insert(product.id, (product.clone(), Instant::now() + self.ttl));
        Ok(())
    }

    async fn delete(&self, id: ProductId) -> Result<(), CacheError> {
        self.check()?;
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        entries.remove(&id);
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use shelfline_products::{CategoryAttributes, ProductData, Unit};

    fn product(id: i64) -> Product {
        let now = Utc::now();
        Product {
            id: ProductId::new(id),
            data: ProductData {
                name: "Cap".to_string(),
                weight: 0.2,
                unit: Unit::Piece,
                color: "red".to_string(),
                price: 9.99,
                attributes: CategoryAttributes::Adult,
            },
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = InMemoryProductCache::new(Duration::from_secs(300));
        let p = product(1);
        cache.set(&p).await.unwrap();

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get(p.id).await.unwrap(), Some(p.clone()));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get(p.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_after_set_returns_the_same_entity() {
        let cache = InMemoryProductCache::new(Duration::from_secs(60));
        let p = product(3);
        cache.set(&p).await.unwrap();
        assert_eq!(cache.get(p.id).await.unwrap(), Some(p.clone()));

        cache.delete(p.id).await.unwrap();
        assert_eq!(cache.get(p.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn failing_cache_reports_errors() {
        let cache = InMemoryProductCache::new(Duration::from_secs(60));
        cache.set_failing(true);
        assert!(cache.get(ProductId::new(1)).await.is_err());
        assert!(cache.set(&product(1)).await.is_err());
    }
}
