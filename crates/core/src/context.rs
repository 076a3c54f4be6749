//! Explicit per-request context.
//!
//! There is no ambient logger or task-local lookup: whatever needs the request
//! id for logging receives a `&RequestContext`.

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    request_id: String,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
        }
    }

    /// Context with a freshly generated (UUIDv7) request id.
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7().to_string())
    }

    /// Context for work not triggered by a client request (start-up, tests).
    pub fn background(label: &str) -> Self {
        Self::new(format!("{label}-{}", Uuid::now_v7()))
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}
