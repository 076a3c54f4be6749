//! PostgreSQL product store.
//!
//! One row per product. Category-specific attributes live in a JSONB column
//! in their flat form; rows are converted back to the typed model on read.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgSslMode};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::instrument;

use shelfline_core::ProductId;
use shelfline_products::{
    AttributeFields, Category, CategoryAttributes, Product, ProductData, ProductFilter, Unit,
};

use super::{ProductStore, StoreError};
use crate::config::DatabaseConfig;

const SCHEMA: [&str; 2] = [
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id          BIGSERIAL PRIMARY KEY,
        name        VARCHAR(255) NOT NULL,
        weight      DOUBLE PRECISION NOT NULL,
        unit        VARCHAR(10) NOT NULL,
        color       VARCHAR(50) NOT NULL DEFAULT '',
        type        VARCHAR(50) NOT NULL,
        price       DOUBLE PRECISION NOT NULL,
        attributes  JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS products_created_at_idx ON products (created_at DESC)",
];

const COLUMNS: &str =
    "id, name, weight, unit, color, type, price, attributes, created_at, updated_at";

/// Opens a pool sized from configuration.
pub async fn connect_postgres(cfg: &DatabaseConfig) -> Result<PgPool, StoreError> {
    let ssl_mode = PgSslMode::from_str(&cfg.ssl_mode)
        .map_err(|e| StoreError::Backend(format!("invalid ssl mode: {e}")))?;

    let options = PgConnectOptions::new()
        .host(&cfg.host)
        .port(cfg.port)
        .username(&cfg.user)
        .password(&cfg.password)
        .database(&cfg.name)
        .ssl_mode(ssl_mode);

    PgPoolOptions::new()
        .max_connections(cfg.max_open_conns)
        .min_connections(cfg.min_connections())
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .map_err(|e| map_sqlx_error("connect", e))
}

#[derive(Debug, Clone)]
pub struct PostgresProductStore {
    pool: Arc<PgPool>,
}

impl PostgresProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Creates the table and index if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ProductStore for PostgresProductStore {
    #[instrument(skip(self, data), fields(name = %data.name), err)]
    async fn create(&self, data: &ProductData) -> Result<Product, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (name, weight, unit, color, type, price, attributes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&data.name)
        .bind(data.weight)
        .bind(data.unit.as_str())
        .bind(&data.color)
        .bind(data.category().as_str())
        .bind(data.price)
        .bind(Json(data.attributes.to_fields()))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create", e))?;

        product_from_row(&row)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn get(&self, id: ProductId) -> Result<Product, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM products WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?
            .ok_or(StoreError::NotFound(id))?;

        product_from_row(&row)
    }

    #[instrument(skip(self, data), fields(product_id = %id), err)]
    async fn update(&self, id: ProductId, data: &ProductData) -> Result<Product, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE products
            SET name = $1, weight = $2, unit = $3, color = $4, type = $5,
                price = $6, attributes = $7, updated_at = NOW()
            WHERE id = $8
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&data.name)
        .bind(data.weight)
        .bind(data.unit.as_str())
        .bind(&data.color)
        .bind(data.category().as_str())
        .bind(data.price)
        .bind(Json(data.attributes.to_fields()))
        .bind(id.get())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update", e))?
        .ok_or(StoreError::NotFound(id))?;

        product_from_row(&row)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn delete(&self, id: ProductId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.get())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let mut query = list_query(filter);
        let rows = query
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list", e))?;

        rows.iter().map(product_from_row).collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&*self.pool)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error("ping", e))
    }
}

fn list_query(filter: &ProductFilter) -> QueryBuilder<'_, Postgres> {
    let mut query = QueryBuilder::new(format!("SELECT {COLUMNS} FROM products WHERE 1=1"));

    if let Some(min) = filter.min_price {
        query.push(" AND price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        query.push(" AND price <= ").push_bind(max);
    }
    if let Some(color) = &filter.color {
        query.push(" AND color = ").push_bind(color.as_str());
    }
    if !filter.categories.is_empty() {
        query.push(" AND type IN (");
        let mut types = query.separated(", ");
        for category in &filter.categories {
            types.push_bind(category.as_str());
        }
        types.push_unseparated(")");
    }

    query
        .push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(i64::from(filter.limit))
        .push(" OFFSET ")
        .push_bind(i64::from(filter.offset));
    query
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Decode(e.to_string());

    let id: i64 = row.try_get("id").map_err(decode)?;
    let unit: String = row.try_get("unit").map_err(decode)?;
    let category: String = row.try_get("type").map_err(decode)?;
    let Json(fields): Json<AttributeFields> = row.try_get("attributes").map_err(decode)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(decode)?;

    let unit = Unit::parse(&unit)
        .ok_or_else(|| StoreError::Decode(format!("product {id} has unknown unit `{unit}`")))?;
    let category = Category::parse(&category).ok_or_else(|| {
        StoreError::Decode(format!("product {id} has unknown type `{category}`"))
    })?;
    let attributes = CategoryAttributes::from_fields(category, &fields)
        .map_err(|e| StoreError::Decode(format!("product {id}: {e}")))?;

    Ok(Product {
        id: ProductId::new(id),
        data: ProductData {
            name: row.try_get("name").map_err(decode)?,
            weight: row.try_get("weight").map_err(decode)?,
            unit,
            color: row.try_get("color").map_err(decode)?,
            price: row.try_get("price").map_err(decode)?,
            attributes,
        },
        created_at,
        updated_at,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => StoreError::Backend(format!(
            "database error in {}: {}",
            operation,
            db_err.message()
        )),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Decode(format!("{operation}: {err}"))
        }
        other => StoreError::Backend(format!("{operation}: {other}")),
    }
}
