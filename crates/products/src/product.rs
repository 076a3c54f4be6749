use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shelfline_core::ProductId;

use crate::attributes::{AttributeError, AttributeFields, CategoryAttributes};

/// Unit a product is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "g")]
    Gram,
    #[serde(rename = "kg")]
    Kilogram,
    #[serde(rename = "l")]
    Liter,
    #[serde(rename = "piece")]
    Piece,
}

impl Unit {
    pub const ALL: [Unit; 4] = [Unit::Gram, Unit::Kilogram, Unit::Liter, Unit::Piece];

    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Gram => "g",
            Unit::Kilogram => "kg",
            Unit::Liter => "l",
            Unit::Piece => "piece",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|u| u.as_str() == s)
    }
}

impl core::fmt::Display for Unit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of catalog categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ClothingHeadwear,
    ClothingBody,
    ClothingPants,
    ClothingShoes,
    Food,
    Furniture,
    Electronics,
    Adult,
    HomeGoods,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::ClothingHeadwear,
        Category::ClothingBody,
        Category::ClothingPants,
        Category::ClothingShoes,
        Category::Food,
        Category::Furniture,
        Category::Electronics,
        Category::Adult,
        Category::HomeGoods,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::ClothingHeadwear => "clothing_headwear",
            Category::ClothingBody => "clothing_body",
            Category::ClothingPants => "clothing_pants",
            Category::ClothingShoes => "clothing_shoes",
            Category::Food => "food",
            Category::Furniture => "furniture",
            Category::Electronics => "electronics",
            Category::Adult => "adult",
            Category::HomeGoods => "home_goods",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl core::fmt::Display for Category {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Product payload as submitted by a client, before validation.
///
/// Unit and category are kept as raw text so that unknown values surface as
/// validation violations rather than parse errors. Missing fields take zero
/// values and are rejected by the validator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductInput {
    pub name: String,
    pub weight: f64,
    pub unit: String,
    pub color: String,
    #[serde(rename = "type")]
    pub category: String,
    pub price: f64,
    pub attributes: AttributeFields,
}

/// Validated product content (everything except identity and timestamps).
///
/// Serialized with a discriminated encoding: the `type` field selects the
/// category and `attributes` holds only that category's fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProductWire", into = "ProductWire")]
pub struct ProductData {
    pub name: String,
    pub weight: f64,
    pub unit: Unit,
    pub color: String,
    pub price: f64,
    pub attributes: CategoryAttributes,
}

impl ProductData {
    pub fn category(&self) -> Category {
        self.attributes.category()
    }
}

#[derive(Serialize, Deserialize)]
struct ProductWire {
    name: String,
    weight: f64,
    unit: Unit,
    #[serde(default)]
    color: String,
    #[serde(rename = "type")]
    category: Category,
    price: f64,
    #[serde(default)]
    attributes: AttributeFields,
}

impl TryFrom<ProductWire> for ProductData {
    type Error = AttributeError;

    fn try_from(wire: ProductWire) -> Result<Self, Self::Error> {
        let attributes = CategoryAttributes::from_fields(wire.category, &wire.attributes)?;
        Ok(Self {
            name: wire.name,
            weight: wire.weight,
            unit: wire.unit,
            color: wire.color,
            price: wire.price,
            attributes,
        })
    }
}

impl From<ProductData> for ProductWire {
    fn from(data: ProductData) -> Self {
        Self {
            category: data.category(),
            attributes: data.attributes.to_fields(),
            name: data.name,
            weight: data.weight,
            unit: data.unit,
            color: data.color,
            price: data.price,
        }
    }
}

/// Snapshot carried inside Created/Updated events.
///
/// For Created the id is the client-side placeholder; the store assigns the
/// real id when the event is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    #[serde(flatten)]
    pub data: ProductData,
}

impl ProductSnapshot {
    pub fn new(id: ProductId, data: ProductData) -> Self {
        Self { id, data }
    }
}

/// Durable product row (store-assigned id and timestamps).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    #[serde(flatten)]
    pub data: ProductData,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn category(&self) -> Category {
        self.data.category()
    }
}
