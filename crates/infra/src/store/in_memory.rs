use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use shelfline_core::ProductId;
use shelfline_products::{Product, ProductData, ProductFilter};

use super::{ProductStore, StoreError};

#[derive(Debug, Default)]
struct Rows {
    next_id: i64,
    rows: BTreeMap<i64, Product>,
}

/// In-memory product store for tests/dev.
///
/// Ids count up from 1. `set_failing(true)` makes every call return a
/// backend error until it is cleared.
#[derive(Debug, Default)]
pub struct InMemoryProductStore {
    inner: RwLock<Rows>,
    failing: AtomicBool,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|r| r.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Backend("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("store lock poisoned".to_string())
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn create(&self, data: &ProductData) -> Result<Product, StoreError> {
        self.check()?;
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        inner.next_id += 1;
        let id = inner.next_id;
        let now = Utc::now();
        let product = Product {
            id: ProductId::new(id),
            data: data.clone(),
            created_at: now,
            updated_at: now,
        };
        inner.rows.insert(id, product.clone());
        Ok(product)
    }

    async fn get(&self, id: ProductId) -> Result<Product, StoreError> {
        self.check()?;
        let inner = self.inner.read().map_err(|_| poisoned())?;
        inner
            .rows
            .get(&id.get())
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn update(&self, id: ProductId, data: &ProductData) -> Result<Product, StoreError> {
        self.check()?;
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        let row = inner
            .rows
            .get_mut(&id.get())
            .ok_or(StoreError::NotFound(id))?;
        row.data = data.clone();
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn delete(&self, id: ProductId) -> Result<(), StoreError> {
        self.check()?;
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        inner
            .rows
            .remove(&id.get())
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        self.check()?;
        let inner = self.inner.read().map_err(|_| poisoned())?;
        // Ids grow with creation time, so reverse id order is newest first.
        Ok(inner
            .rows
            .values()
            .rev()
            .filter(|p| filter.matches(p.data.price, &p.data.color, p.category()))
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfline_products::{Category, CategoryAttributes, Unit};

    fn data(name: &str, price: f64, color: &str) -> ProductData {
        ProductData {
            name: name.to_string(),
            weight: 1.0,
            unit: Unit::Piece,
            color: color.to_string(),
            price,
            attributes: CategoryAttributes::Adult,
        }
    }

    #[tokio::test]
    async fn create_assigns_increasing_ids() {
        let store = InMemoryProductStore::new();
        let a = store.create(&data("a", 1.0, "")).await.unwrap();
        let b = store.create(&data("b", 1.0, "")).await.unwrap();
        assert_eq!(a.id, ProductId::new(1));
        assert_eq!(b.id, ProductId::new(2));
        assert_eq!(store.get(b.id).await.unwrap().data.name, "b");
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_rows() {
        let store = InMemoryProductStore::new();
        let missing = ProductId::new(9);
        assert!(matches!(
            store.update(missing, &data("x", 1.0, "")).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete(missing).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_filters_orders_and_pages() {
        let store = InMemoryProductStore::new();
        store.create(&data("cheap", 1.0, "red")).await.unwrap();
        store.create(&data("mid", 10.0, "red")).await.unwrap();
        store.create(&data("blue", 10.0, "blue")).await.unwrap();
        store.create(&data("pricey", 100.0, "red")).await.unwrap();

        let filter = ProductFilter {
            min_price: Some(5.0),
            color: Some("red".to_string()),
            categories: vec![Category::Adult],
            ..Default::default()
        };
        let names: Vec<_> = store
            .list(&filter)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.data.name)
            .collect();
        assert_eq!(names, vec!["pricey", "mid"]);

        let page = ProductFilter {
            limit: 1,
            offset: 1,
            ..Default::default()
        };
        let names: Vec<_> = store
            .list(&page)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.data.name)
            .collect();
        assert_eq!(names, vec!["blue"]);
    }

    #[tokio::test]
    async fn failing_store_reports_backend_errors() {
        let store = InMemoryProductStore::new();
        store.set_failing(true);
        assert!(matches!(store.ping().await, Err(StoreError::Backend(_))));
        store.set_failing(false);
        assert!(store.ping().await.is_ok());
    }
}
