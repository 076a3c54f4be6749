use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::record::{AppendAck, LogRecord, Offset, OutgoingRecord};

#[derive(Debug, Error)]
pub enum LogError {
    /// Broker unreachable or the request failed in flight.
    #[error("log unavailable: {0}")]
    Unavailable(String),

    /// Fewer replicas acknowledged the write than required.
    #[error("replication not confirmed: {acked} of {required} replicas acknowledged")]
    NotReplicated { required: u32, acked: u32 },

    #[error("unknown partition {partition} (topic has {partitions})")]
    UnknownPartition { partition: u32, partitions: u32 },

    #[error("log protocol error: {0}")]
    Protocol(String),

    #[error("log state lock poisoned")]
    Poisoned,
}

impl LogError {
    /// Whether a retry of the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LogError::Unavailable(_) | LogError::NotReplicated { .. }
        )
    }
}

/// Fetch batching limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Upper bound on how long a fetch blocks when nothing is available.
    pub max_wait: Duration,
    pub max_records: usize,
    /// Byte budget for one batch. At least one record is always returned.
    pub max_bytes: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_millis(100),
            max_records: 100,
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

impl FetchOptions {
    /// Records one partition may contribute to a batch spanning `partitions`
    /// partitions. Never zero.
    pub fn per_partition_limit(&self, partitions: usize) -> usize {
        (self.max_records / partitions.max(1)).max(1)
    }
}

/// Partitioned, ordered, append-only log with per-group committed offsets.
///
/// Guarantees:
/// - Records appended to one partition are fetched in append order.
/// - `fetch` returns only records strictly after the given positions.
/// - `committed` returns [`Offset::ZERO`] for a group that never committed.
/// - A fetch over several partitions takes at most
///   [`FetchOptions::per_partition_limit`] records from each one.
#[async_trait]
pub trait EventLog: Send + Sync {
    fn topic(&self) -> &str;

    fn partitions(&self) -> u32;

    /// Appends and returns once the write is acknowledged.
    async fn append(&self, partition: u32, record: OutgoingRecord)
    -> Result<AppendAck, LogError>;

    async fn fetch(
        &self,
        positions: &[(u32, Offset)],
        options: &FetchOptions,
    ) -> Result<Vec<LogRecord>, LogError>;

    async fn commit(&self, group: &str, partition: u32, offset: Offset) -> Result<(), LogError>;

    async fn committed(&self, group: &str, partition: u32) -> Result<Offset, LogError>;

    async fn ping(&self) -> Result<(), LogError>;
}

#[async_trait]
impl<T> EventLog for Arc<T>
where
    T: EventLog + ?Sized,
{
    fn topic(&self) -> &str {
        (**self).topic()
    }

    fn partitions(&self) -> u32 {
        (**self).partitions()
    }

    async fn append(
        &self,
        partition: u32,
        record: OutgoingRecord,
    ) -> Result<AppendAck, LogError> {
        (**self).append(partition, record).await
    }

    async fn fetch(
        &self,
        positions: &[(u32, Offset)],
        options: &FetchOptions,
    ) -> Result<Vec<LogRecord>, LogError> {
        (**self).fetch(positions, options).await
    }

    async fn commit(&self, group: &str, partition: u32, offset: Offset) -> Result<(), LogError> {
        (**self).commit(group, partition, offset).await
    }

    async fn committed(&self, group: &str, partition: u32) -> Result<Offset, LogError> {
        (**self).committed(group, partition).await
    }

    async fn ping(&self) -> Result<(), LogError> {
        (**self).ping().await
    }
}

/// Cuts a batch down to `max_bytes`, keeping at least the first record.
///
/// Batches list each partition's records in order, so any prefix is a
/// per-partition prefix.
pub fn truncate_to_bytes(records: &mut Vec<LogRecord>, max_bytes: usize) {
    let mut total = 0usize;
    let mut keep = 0usize;
    for record in records.iter() {
        total = total.saturating_add(record.size_bytes());
        if keep > 0 && total > max_bytes {
            break;
        }
        keep += 1;
    }
    records.truncate(keep);
}
