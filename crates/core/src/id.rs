//! Strongly-typed identifiers.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::IdError;

/// Identifier of a catalog product.
///
/// Assigned by the durable store on insert. Before that, writes carry the
/// placeholder [`ProductId::UNASSIGNED`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(i64);

impl ProductId {
    /// Placeholder carried by Created events; never a store-assigned value.
    pub const UNASSIGNED: ProductId = ProductId(0);

    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for ProductId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<ProductId> for i64 {
    fn from(value: ProductId) -> Self {
        value.0
    }
}

impl FromStr for ProductId {
    type Err = IdError;

    /// Parses a path/identifier segment; only positive integers are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<i64>()
            .map_err(|e| IdError(format!("ProductId: {e}")))?;
        if value <= 0 {
            return Err(IdError(format!("ProductId: must be positive, got {value}")));
        }
        Ok(Self(value))
    }
}
