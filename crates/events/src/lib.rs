//! Catalog mutation events and the partitioned log they travel through.

pub mod envelope;
pub mod in_memory_log;
pub mod log;
pub mod partitioner;
pub mod record;

pub use envelope::{DecodeError, EventEnvelope, EventKind, ProductChange};
pub use in_memory_log::InMemoryEventLog;
pub use log::{EventLog, FetchOptions, LogError, truncate_to_bytes};
pub use partitioner::{message_key, partition_for_key};
pub use record::{AppendAck, LogRecord, Offset, OffsetParseError, OutgoingRecord, RecordHeaders};
