use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::product::Category;

/// Flat superset of every category-specific field.
///
/// This is the wire and storage shape; [`CategoryAttributes`] is the typed
/// form the rest of the crate works with. Fields that do not belong to a
/// product's category are ignored when converting.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_circumference: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chest_circumference: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waist_circumference: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hip_circumference: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foot_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nutritional_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warranty_months: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttributeError {
    #[error("{category} product is missing required attribute `{attribute}`")]
    Missing {
        category: Category,
        attribute: &'static str,
    },

    #[error("attribute `{attribute}` is out of range")]
    OutOfRange { attribute: &'static str },

    #[error("attribute `{attribute}` exceeds {max}")]
    TooLarge { attribute: &'static str, max: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeadwearAttributes {
    pub head_circumference: f64,
    pub size: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BodyAttributes {
    pub chest_circumference: f64,
    pub size: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PantsAttributes {
    pub waist_circumference: f64,
    pub hip_circumference: Option<f64>,
    pub size: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShoeAttributes {
    pub foot_size: f64,
    pub size: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoodAttributes {
    pub expiry_date: DateTime<Utc>,
    pub nutritional_info: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElectronicsAttributes {
    pub warranty_months: u32,
    pub voltage: Option<String>,
}

/// Shared by furniture and home goods.
#[derive(Debug, Clone, PartialEq)]
pub struct FurnishingAttributes {
    pub dimensions: String,
    pub material: Option<String>,
}

/// Category together with the attributes that category carries.
#[derive(Debug, Clone, PartialEq)]
pub enum CategoryAttributes {
    Headwear(HeadwearAttributes),
    BodyClothing(BodyAttributes),
    Pants(PantsAttributes),
    Shoes(ShoeAttributes),
    Food(FoodAttributes),
    Furniture(FurnishingAttributes),
    HomeGoods(FurnishingAttributes),
    Electronics(ElectronicsAttributes),
    Adult,
}

fn text(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.is_empty()).cloned()
}

fn required<T>(
    category: Category,
    attribute: &'static str,
    value: Option<T>,
) -> Result<T, AttributeError> {
    value.ok_or(AttributeError::Missing {
        category,
        attribute,
    })
}

impl CategoryAttributes {
    pub fn category(&self) -> Category {
        match self {
            CategoryAttributes::Headwear(_) => Category::ClothingHeadwear,
            CategoryAttributes::BodyClothing(_) => Category::ClothingBody,
            CategoryAttributes::Pants(_) => Category::ClothingPants,
            CategoryAttributes::Shoes(_) => Category::ClothingShoes,
            CategoryAttributes::Food(_) => Category::Food,
            CategoryAttributes::Furniture(_) => Category::Furniture,
            CategoryAttributes::HomeGoods(_) => Category::HomeGoods,
            CategoryAttributes::Electronics(_) => Category::Electronics,
            CategoryAttributes::Adult => Category::Adult,
        }
    }

    /// Structural conversion from the flat form.
    ///
    /// Only presence is checked here; value rules belong to the validator.
    pub fn from_fields(category: Category, fields: &AttributeFields) -> Result<Self, AttributeError> {
        let attributes = match category {
            Category::ClothingHeadwear => CategoryAttributes::Headwear(HeadwearAttributes {
                head_circumference: required(
                    category,
                    "head_circumference",
                    fields.head_circumference,
                )?,
                size: text(&fields.size),
            }),
            Category::ClothingBody => CategoryAttributes::BodyClothing(BodyAttributes {
                chest_circumference: required(
                    category,
                    "chest_circumference",
                    fields.chest_circumference,
                )?,
                size: text(&fields.size),
            }),
            Category::ClothingPants => CategoryAttributes::Pants(PantsAttributes {
                waist_circumference: required(
                    category,
                    "waist_circumference",
                    fields.waist_circumference,
                )?,
                hip_circumference: fields.hip_circumference,
                size: text(&fields.size),
            }),
            Category::ClothingShoes => CategoryAttributes::Shoes(ShoeAttributes {
                foot_size: required(category, "foot_size", fields.foot_size)?,
                size: text(&fields.size),
            }),
            Category::Food => CategoryAttributes::Food(FoodAttributes {
                expiry_date: required(category, "expiry_date", fields.expiry_date)?,
                nutritional_info: text(&fields.nutritional_info),
            }),
            Category::Furniture | Category::HomeGoods => {
                let furnishing = FurnishingAttributes {
                    dimensions: required(category, "dimensions", text(&fields.dimensions))?,
                    material: text(&fields.material),
                };
                if category == Category::Furniture {
                    CategoryAttributes::Furniture(furnishing)
                } else {
                    CategoryAttributes::HomeGoods(furnishing)
                }
            }
            Category::Electronics => {
                let months = required(category, "warranty_months", fields.warranty_months)?;
                CategoryAttributes::Electronics(ElectronicsAttributes {
                    warranty_months: u32::try_from(months).map_err(|_| {
                        if months > 0 {
                            AttributeError::TooLarge {
                                attribute: "warranty_months",
                                max: u64::from(u32::MAX),
                            }
                        } else {
                            AttributeError::OutOfRange {
                                attribute: "warranty_months",
                            }
                        }
                    })?,
                    voltage: text(&fields.voltage),
                })
            }
            Category::Adult => CategoryAttributes::Adult,
        };
        Ok(attributes)
    }

    pub fn to_fields(&self) -> AttributeFields {
        let mut fields = AttributeFields::default();
        match self {
            CategoryAttributes::Headwear(a) => {
                fields.head_circumference = Some(a.head_circumference);
                fields.size = a.size.clone();
            }
            CategoryAttributes::BodyClothing(a) => {
                fields.chest_circumference = Some(a.chest_circumference);
                fields.size = a.size.clone();
            }
            CategoryAttributes::Pants(a) => {
                fields.waist_circumference = Some(a.waist_circumference);
                fields.hip_circumference = a.hip_circumference;
                fields.size = a.size.clone();
            }
            CategoryAttributes::Shoes(a) => {
                fields.foot_size = Some(a.foot_size);
                fields.size = a.size.clone();
            }
            CategoryAttributes::Food(a) => {
                fields.expiry_date = Some(a.expiry_date);
                fields.nutritional_info = a.nutritional_info.clone();
            }
            CategoryAttributes::Furniture(a) | CategoryAttributes::HomeGoods(a) => {
                fields.dimensions = Some(a.dimensions.clone());
                fields.material = a.material.clone();
            }
            CategoryAttributes::Electronics(a) => {
                fields.warranty_months = Some(i64::from(a.warranty_months));
                fields.voltage = a.voltage.clone();
            }
            CategoryAttributes::Adult => {}
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_keeps_only_the_category_fields() {
        let fields = AttributeFields {
            waist_circumference: Some(80.0),
            hip_circumference: Some(95.0),
            size: Some("M".to_string()),
            voltage: Some("220V".to_string()),
            ..Default::default()
        };

        let attributes = CategoryAttributes::from_fields(Category::ClothingPants, &fields).unwrap();
        assert_eq!(attributes.category(), Category::ClothingPants);

        let flat = attributes.to_fields();
        assert_eq!(flat.voltage, None);
        assert_eq!(flat.waist_circumference, Some(80.0));
        assert_eq!(flat.hip_circumference, Some(95.0));
    }

    #[test]
    fn empty_dimensions_count_as_missing() {
        let fields = AttributeFields {
            dimensions: Some(String::new()),
            ..Default::default()
        };
        let err = CategoryAttributes::from_fields(Category::HomeGoods, &fields).unwrap_err();
        assert_eq!(
            err,
            AttributeError::Missing {
                category: Category::HomeGoods,
                attribute: "dimensions"
            }
        );
    }

    #[test]
    fn negative_warranty_is_out_of_range() {
        let fields = AttributeFields {
            warranty_months: Some(-1),
            ..Default::default()
        };
        let err = CategoryAttributes::from_fields(Category::Electronics, &fields).unwrap_err();
        assert!(matches!(err, AttributeError::OutOfRange { .. }));
    }

    #[test]
    fn oversized_warranty_is_too_large() {
        let fields = AttributeFields {
            warranty_months: Some(i64::from(u32::MAX) + 1),
            ..Default::default()
        };
        let err = CategoryAttributes::from_fields(Category::Electronics, &fields).unwrap_err();
        assert_eq!(
            err,
            AttributeError::TooLarge {
                attribute: "warranty_months",
                max: u64::from(u32::MAX)
            }
        );
    }

    #[test]
    fn adult_carries_no_attributes() {
        let attributes =
            CategoryAttributes::from_fields(Category::Adult, &AttributeFields::default()).unwrap();
        assert_eq!(attributes.to_fields(), AttributeFields::default());
    }
}
