use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shelfline_core::{ErrorKind, ProductId};
use shelfline_products::ProductSnapshot;

use crate::partitioner::message_key;

/// Kind of mutation an envelope describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "product_created")]
    Created,
    #[serde(rename = "product_updated")]
    Updated,
    #[serde(rename = "product_deleted")]
    Deleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "product_created",
            EventKind::Updated => "product_updated",
            EventKind::Deleted => "product_deleted",
        }
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A catalog mutation accepted on the write path.
#[derive(Debug, Clone, PartialEq)]
pub enum ProductChange {
    Created(ProductSnapshot),
    Updated(ProductSnapshot),
    Deleted(ProductId),
}

impl ProductChange {
    pub fn kind(&self) -> EventKind {
        match self {
            ProductChange::Created(_) => EventKind::Created,
            ProductChange::Updated(_) => EventKind::Updated,
            ProductChange::Deleted(_) => EventKind::Deleted,
        }
    }

    pub fn product_id(&self) -> ProductId {
        match self {
            ProductChange::Created(s) | ProductChange::Updated(s) => s.id,
            ProductChange::Deleted(id) => *id,
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),

    #[error("deleted event {0} carries a product snapshot")]
    UnexpectedSnapshot(Uuid),

    #[error("header `{header}` is `{found}` but the envelope says `{expected}`")]
    HeaderMismatch {
        header: &'static str,
        expected: String,
        found: String,
    },
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Decode
    }
}

/// Unit carried through the log for every accepted write.
///
/// Notes:
/// - `product_id` is always set. For Created it is the client-side placeholder.
/// - `product_data` is present for Created/Updated and never for Deleted.
/// - `sequence` is strictly increasing per `producer_id` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    event_id: Uuid,
    event_type: EventKind,
    timestamp: DateTime<Utc>,
    product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    product_data: Option<ProductSnapshot>,
    producer_id: String,
    sequence: u64,
}

impl EventEnvelope {
    pub fn new(
        change: ProductChange,
        producer_id: impl Into<String>,
        sequence: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let event_type = change.kind();
        let product_id = change.product_id();
        let product_data = match change {
            ProductChange::Created(s) | ProductChange::Updated(s) => Some(s),
            ProductChange::Deleted(_) => None,
        };
        Self {
            event_id: Uuid::now_v7(),
            event_type,
            timestamp,
            product_id,
            product_data,
            producer_id: producer_id.into(),
            sequence,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn kind(&self) -> EventKind {
        self.event_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn product_data(&self) -> Option<&ProductSnapshot> {
        self.product_data.as_ref()
    }

    pub fn into_product_data(self) -> Option<ProductSnapshot> {
        self.product_data
    }

    pub fn producer_id(&self) -> &str {
        &self.producer_id
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Partition key shared by every event about the same product.
    pub fn message_key(&self) -> String {
        message_key(self.product_id)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let envelope: Self = serde_json::from_slice(bytes)?;
        if envelope.event_type == EventKind::Deleted && envelope.product_data.is_some() {
            return Err(DecodeError::UnexpectedSnapshot(envelope.event_id));
        }
        Ok(envelope)
    }
}
