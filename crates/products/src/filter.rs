use crate::product::Category;

pub const DEFAULT_LIMIT: u32 = 25;
pub const MAX_LIMIT: u32 = 100;

/// Criteria for listing products.
///
/// All set criteria combine with AND; an empty `categories` list means any
/// category. Results are ordered newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductFilter {
    pub limit: u32,
    pub offset: u32,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub color: Option<String>,
    pub categories: Vec<Category>,
}

impl Default for ProductFilter {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
            min_price: None,
            max_price: None,
            color: None,
            categories: Vec::new(),
        }
    }
}

impl ProductFilter {
    /// Whether a product with these attributes satisfies the non-paging criteria.
    pub fn matches(&self, price: f64, color: &str, category: Category) -> bool {
        if self.min_price.is_some_and(|min| price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| price > max) {
            return false;
        }
        if self.color.as_deref().is_some_and(|c| c != color) {
            return false;
        }
        self.categories.is_empty() || self.categories.contains(&category)
    }
}
