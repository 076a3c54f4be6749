//! `shelfline-core` — shared building blocks for the catalog pipeline.
//!
//! This crate holds **pure** primitives (no IO): identifiers, the error-kind
//! taxonomy every layer reports through, and the request context that is
//! passed explicitly to anything that logs.

pub mod context;
pub mod error;
pub mod id;

pub use context::RequestContext;
pub use error::{ErrorKind, IdError};
pub use id::ProductId;
