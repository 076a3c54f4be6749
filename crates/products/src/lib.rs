//! Products domain module.
//!
//! This crate contains the catalog entity and its business rules, implemented
//! purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod attributes;
pub mod filter;
pub mod product;
pub mod validation;

pub use attributes::{
    AttributeError, AttributeFields, BodyAttributes, CategoryAttributes, ElectronicsAttributes,
    FoodAttributes, FurnishingAttributes, HeadwearAttributes, PantsAttributes, ShoeAttributes,
};
pub use filter::ProductFilter;
pub use product::{Category, Product, ProductData, ProductInput, ProductSnapshot, Unit};
pub use validation::{ProductValidator, ValidationError};

pub use shelfline_core::ProductId;
