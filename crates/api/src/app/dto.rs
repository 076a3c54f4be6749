use serde::Serialize;
use uuid::Uuid;

use shelfline_core::ProductId;
use shelfline_infra::Accepted;
use shelfline_products::filter::MAX_LIMIT;
use shelfline_products::{Category, Product, ProductFilter};

// -------------------------
// Response DTOs
// -------------------------

/// Body of every 202 response: the write was queued, not applied.
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub id: ProductId,
    pub event_id: Uuid,
    pub message: &'static str,
    pub status: &'static str,
}

impl AcceptedResponse {
    pub fn new(accepted: Accepted, message: &'static str) -> Self {
        Self {
            id: accepted.product_id,
            event_id: accepted.event_id,
            message,
            status: "processing",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListProductsResponse {
    pub products: Vec<Product>,
    pub total: usize,
    pub limit: u32,
    pub offset: u32,
}

impl ListProductsResponse {
    pub fn new(products: Vec<Product>, filter: &ProductFilter) -> Self {
        Self {
            total: products.len(),
            products,
            limit: filter.limit,
            offset: filter.offset,
        }
    }
}

// -------------------------
// Query mapping
// -------------------------

/// Parsed list query.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub filter: ProductFilter,
    /// `type` was given but none of the values name a known category, so
    /// nothing can match.
    pub matches_nothing: bool,
}

/// Builds a list query from raw query pairs.
///
/// Out-of-range or unparsable values fall back to their defaults rather than
/// failing the request. `type` may repeat.
pub fn list_query(params: &[(String, String)]) -> ListQuery {
    let mut filter = ProductFilter::default();
    let mut saw_type = false;

    for (key, value) in params {
        let value = value.trim();
        match key.as_str() {
            "limit" => {
                if let Ok(limit) = value.parse::<u32>() {
                    if (1..=MAX_LIMIT).contains(&limit) {
                        filter.limit = limit;
                    }
                }
            }
            "offset" => {
                if let Ok(offset) = value.parse::<u32>() {
                    filter.offset = offset;
                }
            }
            "min_price" => filter.min_price = non_negative(value).or(filter.min_price),
            "max_price" => filter.max_price = non_negative(value).or(filter.max_price),
            "color" if !value.is_empty() => filter.color = Some(value.to_owned()),
            "type" => {
                saw_type = true;
                if let Some(category) = Category::parse(value) {
                    if !filter.categories.contains(&category) {
                        filter.categories.push(category);
                    }
                }
            }
            _ => {}
        }
    }

    ListQuery {
        matches_nothing: saw_type && filter.categories.is_empty(),
        filter,
    }
}

fn non_negative(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| *v >= 0.0)
}
