use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::attributes::{AttributeError, CategoryAttributes};
use crate::product::{Category, ProductData, ProductInput, Unit};

pub const MAX_NAME_CHARS: usize = 255;
pub const MAX_COLOR_CHARS: usize = 50;

/// The first business rule a product payload violates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("product name must be between 1 and 255 characters")]
    InvalidName,

    #[error("product weight must be positive")]
    NonPositiveWeight,

    #[error("invalid unit: {0}. Must be one of: g, kg, l, piece")]
    InvalidUnit(String),

    #[error("price cannot be negative")]
    NegativePrice,

    #[error("color must be 50 characters or less")]
    ColorTooLong,

    #[error("unknown product type: {0}")]
    UnknownCategory(String),

    #[error("{attribute} is required for {category}")]
    MissingAttribute {
        category: Category,
        attribute: &'static str,
    },

    #[error("{attribute} must be positive")]
    NonPositiveAttribute { attribute: &'static str },

    #[error("{attribute} must be at most {max}")]
    AttributeTooLarge { attribute: &'static str, max: u64 },

    #[error("{0} must be measured in pieces")]
    PieceUnitRequired(Category),

    #[error("expiry date cannot be in the past")]
    ExpiryNotInFuture,
}

impl From<AttributeError> for ValidationError {
    fn from(err: AttributeError) -> Self {
        match err {
            AttributeError::Missing {
                category,
                attribute,
            } => ValidationError::MissingAttribute {
                category,
                attribute,
            },
            AttributeError::OutOfRange { attribute } => {
                ValidationError::NonPositiveAttribute { attribute }
            }
            AttributeError::TooLarge { attribute, max } => {
                ValidationError::AttributeTooLarge { attribute, max }
            }
        }
    }
}

/// Stateless business-rule checker.
///
/// Rules are evaluated in a fixed order and the first violation wins:
/// name, weight, unit, price, color, then the category rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductValidator;

impl ProductValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validates `input` against the rules in force at `now`.
    pub fn validate(
        &self,
        input: &ProductInput,
        now: DateTime<Utc>,
    ) -> Result<ProductData, ValidationError> {
        let name_len = input.name.chars().count();
        if name_len == 0 || name_len > MAX_NAME_CHARS {
            return Err(ValidationError::InvalidName);
        }

        // Written negated so NaN is rejected too.
        if !(input.weight > 0.0) {
            return Err(ValidationError::NonPositiveWeight);
        }

        let unit = Unit::parse(&input.unit)
            .ok_or_else(|| ValidationError::InvalidUnit(input.unit.clone()))?;

        if !(input.price >= 0.0) {
            return Err(ValidationError::NegativePrice);
        }

        if input.color.chars().count() > MAX_COLOR_CHARS {
            return Err(ValidationError::ColorTooLong);
        }

        let category = Category::parse(&input.category)
            .ok_or_else(|| ValidationError::UnknownCategory(input.category.clone()))?;

        let attributes = CategoryAttributes::from_fields(category, &input.attributes)?;
        check_category_rules(&attributes, unit, now)?;

        Ok(ProductData {
            name: input.name.clone(),
            weight: input.weight,
            unit,
            color: input.color.clone(),
            price: input.price,
            attributes,
        })
    }
}

fn positive(attribute: &'static str, value: f64) -> Result<(), ValidationError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::NonPositiveAttribute { attribute })
    }
}

fn piece_only(category: Category, unit: Unit) -> Result<(), ValidationError> {
    if unit == Unit::Piece {
        Ok(())
    } else {
        Err(ValidationError::PieceUnitRequired(category))
    }
}

fn check_category_rules(
    attributes: &CategoryAttributes,
    unit: Unit,
    now: DateTime<Utc>,
) -> Result<(), ValidationError> {
    let category = attributes.category();
    match attributes {
        CategoryAttributes::Headwear(a) => {
            positive("head_circumference", a.head_circumference)?;
            piece_only(category, unit)
        }
        CategoryAttributes::BodyClothing(a) => {
            positive("chest_circumference", a.chest_circumference)?;
            piece_only(category, unit)
        }
        CategoryAttributes::Pants(a) => {
            positive("waist_circumference", a.waist_circumference)?;
            piece_only(category, unit)
        }
        CategoryAttributes::Shoes(a) => {
            positive("foot_size", a.foot_size)?;
            piece_only(category, unit)
        }
        CategoryAttributes::Electronics(a) => {
            if a.warranty_months == 0 {
                return Err(ValidationError::NonPositiveAttribute {
                    attribute: "warranty_months",
                });
            }
            Ok(())
        }
        CategoryAttributes::Food(a) => {
            if a.expiry_date <= now {
                return Err(ValidationError::ExpiryNotInFuture);
            }
            Ok(())
        }
        // Presence of a non-empty dimensions string is enforced by the conversion.
        CategoryAttributes::Furniture(_) | CategoryAttributes::HomeGoods(_) => Ok(()),
        CategoryAttributes::Adult => Ok(()),
    }
}
