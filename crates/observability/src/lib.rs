//! Process-wide tracing setup shared by the API and processor binaries.

mod tracing;

pub use crate::tracing::{LogFormat, init};
