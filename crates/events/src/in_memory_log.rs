//! In-memory event log for tests/dev.

use std::collections::HashMap;
use std::pin::pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::log::{EventLog, FetchOptions, LogError, truncate_to_bytes};
use crate::record::{AppendAck, LogRecord, Offset, OutgoingRecord};

#[derive(Debug, Default)]
struct State {
    partitions: Vec<Vec<LogRecord>>,
    committed: HashMap<(String, u32), Offset>,
}

/// In-memory partitioned log.
///
/// - Offsets are `0-{n}` with `n` counting from 1 per partition
/// - Fetch blocks up to `max_wait` for new appends
/// - Failures can be injected to exercise retry and fatal paths
#[derive(Debug)]
pub struct InMemoryEventLog {
    topic: String,
    partition_count: u32,
    state: Mutex<State>,
    appended: Notify,
    failing_appends: AtomicU32,
    fail_fetch: AtomicBool,
}

impl InMemoryEventLog {
    pub fn new(topic: impl Into<String>, partitions: u32) -> Self {
        let partition_count = partitions.max(1);
        Self {
            topic: topic.into(),
            partition_count,
            state: Mutex::new(State {
                partitions: vec![Vec::new(); partition_count as usize],
                committed: HashMap::new(),
            }),
            appended: Notify::new(),
            failing_appends: AtomicU32::new(0),
            fail_fetch: AtomicBool::new(false),
        }
    }

    /// The next `n` appends fail with a transient error.
    pub fn fail_next_appends(&self, n: u32) {
        self.failing_appends.store(n, Ordering::SeqCst);
    }

    /// The next fetch fails with a non-transient error.
    pub fn fail_next_fetch(&self) {
        self.fail_fetch.store(true, Ordering::SeqCst);
    }

    /// All records of one partition, in append order.
    pub fn records(&self, partition: u32) -> Vec<LogRecord> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.partitions.get(partition as usize).cloned())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .map(|s| s.partitions.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_partition(&self, partition: u32) -> Result<(), LogError> {
        if partition < self.partition_count {
            Ok(())
        } else {
            Err(LogError::UnknownPartition {
                partition,
                partitions: self.partition_count,
            })
        }
    }

    fn collect(
        &self,
        positions: &[(u32, Offset)],
        options: &FetchOptions,
    ) -> Result<Vec<LogRecord>, LogError> {
        let state = self.state.lock().map_err(|_| LogError::Poisoned)?;
        let share = options.per_partition_limit(positions.len());
        let mut batch = Vec::new();
        for (partition, position) in positions {
            self.check_partition(*partition)?;
            let remaining = options.max_records.saturating_sub(batch.len());
            batch.extend(
                state.partitions[*partition as usize]
                    .iter()
                    .filter(|r| r.offset > *position)
                    .take(remaining.min(share))
                    .cloned(),
            );
        }
        truncate_to_bytes(&mut batch, options.max_bytes);
        Ok(batch)
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn partitions(&self) -> u32 {
        self.partition_count
    }

    async fn append(
        &self,
        partition: u32,
        record: OutgoingRecord,
    ) -> Result<AppendAck, LogError> {
        self.check_partition(partition)?;

        let injected = self
            .failing_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(LogError::Unavailable("injected append failure".to_string()));
        }

        let ack = {
            let mut state = self.state.lock().map_err(|_| LogError::Poisoned)?;
            let stream = &mut state.partitions[partition as usize];
            let offset = Offset::new(0, stream.len() as u64 + 1);
            stream.push(LogRecord {
                partition,
                offset,
                key: record.key,
                headers: record.headers,
                payload: record.payload,
            });
            AppendAck { partition, offset }
        };
        self.appended.notify_waiters();
        Ok(ack)
    }

    async fn fetch(
        &self,
        positions: &[(u32, Offset)],
        options: &FetchOptions,
    ) -> Result<Vec<LogRecord>, LogError> {
        if self.fail_fetch.swap(false, Ordering::SeqCst) {
            return Err(LogError::Protocol("injected fetch failure".to_string()));
        }

        // Register interest before looking so an append in between is not missed.
        let mut notified = pin!(self.appended.notified());
        notified.as_mut().enable();

        let batch = self.collect(positions, options)?;
        if !batch.is_empty() || options.max_wait.is_zero() {
            return Ok(batch);
        }

        let _ = tokio::time::timeout(options.max_wait, notified).await;
        self.collect(positions, options)
    }

    async fn commit(&self, group: &str, partition: u32, offset: Offset) -> Result<(), LogError> {
        self.check_partition(partition)?;
        let mut state = self.state.lock().map_err(|_| LogError::Poisoned)?;
        state
            .committed
            .insert((group.to_string(), partition), offset);
        Ok(())
    }

    async fn committed(&self, group: &str, partition: u32) -> Result<Offset, LogError> {
        self.check_partition(partition)?;
        let state = self.state.lock().map_err(|_| LogError::Poisoned)?;
        Ok(state
            .committed
            .get(&(group.to_string(), partition))
            .copied()
            .unwrap_or(Offset::ZERO))
    }

    async fn ping(&self) -> Result<(), LogError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::record::RecordHeaders;

    fn outgoing(key: &str, payload: &str) -> OutgoingRecord {
        OutgoingRecord {
            key: key.to_string(),
            headers: RecordHeaders {
                event_type: "product_created".to_string(),
                producer_id: "p".to_string(),
            },
            payload: payload.as_bytes().to_vec(),
        }
    }

    fn opts(max_records: usize) -> FetchOptions {
        FetchOptions {
            max_wait: Duration::ZERO,
            max_records,
            max_bytes: usize::MAX,
        }
    }

    #[tokio::test]
    async fn fetch_returns_records_after_position_in_order() {
        let log = InMemoryEventLog::new("products", 2);
        for i in 0..3 {
            log.append(0, outgoing("k", &i.to_string())).await.unwrap();
        }

        let batch = log.fetch(&[(0, Offset::new(0, 1))], &opts(10)).await.unwrap();
        let payloads: Vec<_> = batch.iter().map(|r| r.payload.clone()).collect();
        assert_eq!(payloads, vec![b"1".to_vec(), b"2".to_vec()]);
    }

    #[tokio::test]
    async fn fetch_honors_max_records() {
        let log = InMemoryEventLog::new("products", 1);
        for _ in 0..5 {
            log.append(0, outgoing("k", "x")).await.unwrap();
        }
        let batch = log.fetch(&[(0, Offset::ZERO)], &opts(2)).await.unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn backlog_on_one_partition_leaves_room_for_the_others() {
        let log = InMemoryEventLog::new("products", 2);
        for _ in 0..10 {
            log.append(0, outgoing("a", "x")).await.unwrap();
        }
        log.append(1, outgoing("b", "y")).await.unwrap();

        let batch = log
            .fetch(&[(0, Offset::ZERO), (1, Offset::ZERO)], &opts(4))
            .await
            .unwrap();
        assert_eq!(batch.iter().filter(|r| r.partition == 0).count(), 2);
        assert_eq!(batch.iter().filter(|r| r.partition == 1).count(), 1);
    }

    #[tokio::test]
    async fn committed_defaults_to_zero_and_is_per_group() {
        let log = InMemoryEventLog::new("products", 1);
        assert_eq!(log.committed("g", 0).await.unwrap(), Offset::ZERO);
        log.commit("g", 0, Offset::new(0, 3)).await.unwrap();
        assert_eq!(log.committed("g", 0).await.unwrap(), Offset::new(0, 3));
        assert_eq!(log.committed("other", 0).await.unwrap(), Offset::ZERO);
    }

    #[tokio::test]
    async fn injected_append_failures_are_transient_and_counted() {
        let log = InMemoryEventLog::new("products", 1);
        log.fail_next_appends(2);
        assert!(log.append(0, outgoing("k", "a")).await.unwrap_err().is_transient());
        assert!(log.append(0, outgoing("k", "a")).await.is_err());
        assert!(log.append(0, outgoing("k", "a")).await.is_ok());
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn unknown_partition_is_rejected() {
        let log = InMemoryEventLog::new("products", 1);
        let err = log.append(3, outgoing("k", "a")).await.unwrap_err();
        assert!(matches!(err, LogError::UnknownPartition { partition: 3, .. }));
    }

    #[tokio::test]
    async fn blocked_fetch_wakes_on_append() {
        let log = Arc::new(InMemoryEventLog::new("products", 1));
        let reader = {
            let log = log.clone();
            tokio::spawn(async move {
                let options = FetchOptions {
                    max_wait: Duration::from_secs(5),
                    ..FetchOptions::default()
                };
                log.fetch(&[(0, Offset::ZERO)], &options).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        log.append(0, outgoing("k", "late")).await.unwrap();

        let batch = reader.await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn empty_fetch_waits_at_most_max_wait() {
        let log = InMemoryEventLog::new("products", 1);
        let options = FetchOptions {
            max_wait: Duration::from_millis(10),
            ..FetchOptions::default()
        };
        let batch = log.fetch(&[(0, Offset::ZERO)], &options).await.unwrap();
        assert!(batch.is_empty());
    }
}
