//! Synchronous, acknowledged event producer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use shelfline_core::RequestContext;
use shelfline_events::{
    EventEnvelope, EventLog, LogError, OutgoingRecord, ProductChange, RecordHeaders,
    partition_for_key,
};

use crate::config::ProducerConfig;

#[derive(Debug, Error)]
pub enum ProduceError {
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("append failed after {attempts} attempt(s): {source}")]
    Log {
        attempts: u32,
        #[source]
        source: LogError,
    },
}

/// Sends one envelope per accepted write and returns only after the log
/// acknowledged it.
///
/// - The partition is derived from `product-{id}`, so events about one product
///   stay in send order.
/// - Transient log errors are retried up to `max_attempts` in total.
/// - Sequences are strictly increasing for this producer instance.
pub struct EventProducer {
    log: Arc<dyn EventLog>,
    producer_id: String,
    last_sequence: AtomicU64,
    config: ProducerConfig,
}

impl std::fmt::Debug for EventProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventProducer")
            .field("producer_id", &self.producer_id)
            .field("topic", &self.log.topic())
            .field("config", &self.config)
            .finish()
    }
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

impl EventProducer {
    pub fn new(log: Arc<dyn EventLog>, config: ProducerConfig) -> Self {
        Self {
            log,
            producer_id: format!("producer-{}", now_nanos()),
            last_sequence: AtomicU64::new(0),
            config,
        }
    }

    pub fn producer_id(&self) -> &str {
        &self.producer_id
    }

    fn next_sequence(&self) -> u64 {
        let now = now_nanos();
        let previous = self
            .last_sequence
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|last| last);
        now.max(previous.saturating_add(1))
    }

    #[instrument(
        skip(self, ctx, change),
        fields(
            request_id = %ctx.request_id(),
            event_type = %change.kind(),
            product_id = %change.product_id()
        ),
        err
    )]
    pub async fn send(
        &self,
        ctx: &RequestContext,
        change: ProductChange,
    ) -> Result<EventEnvelope, ProduceError> {
        let envelope = EventEnvelope::new(change, &self.producer_id, self.next_sequence(), Utc::now());
        let key = envelope.message_key();
        let partition = partition_for_key(&key, self.log.partitions());
        let record = OutgoingRecord {
            key,
            headers: RecordHeaders {
                event_type: envelope.kind().as_str().to_string(),
                producer_id: self.producer_id.clone(),
            },
            payload: envelope.encode()?,
        };

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.log.append(partition, record.clone()).await {
                Ok(ack) => {
                    info!(
                        event_id = %envelope.event_id(),
                        partition = ack.partition,
                        offset = %ack.offset,
                        sequence = envelope.sequence(),
                        "event sent"
                    );
                    return Ok(envelope);
                }
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    warn!(attempt, error = %err, "append failed, retrying");
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                Err(source) => {
                    return Err(ProduceError::Log {
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use shelfline_core::ProductId;
    use shelfline_events::{EventKind, InMemoryEventLog, message_key};
    use shelfline_products::{CategoryAttributes, ProductData, ProductSnapshot, Unit};

    fn data(name: &str) -> ProductData {
        ProductData {
            name: name.to_string(),
            weight: 0.2,
            unit: Unit::Piece,
            color: "red".to_string(),
            price: 9.99,
            attributes: CategoryAttributes::Adult,
        }
    }

    fn setup(partitions: u32) -> (Arc<InMemoryEventLog>, EventProducer) {
        let log = Arc::new(InMemoryEventLog::new("products", partitions));
        let producer = EventProducer::new(
            log.clone(),
            ProducerConfig {
                max_attempts: 3,
                retry_backoff: Duration::ZERO,
            },
        );
        (log, producer)
    }

    fn ctx() -> RequestContext {
        RequestContext::new("test")
    }

    #[tokio::test]
    async fn created_event_is_appended_with_headers_and_snapshot() {
        let (log, producer) = setup(3);
        let change = ProductChange::Created(ProductSnapshot::new(ProductId::UNASSIGNED, data("Cap")));
        let envelope = producer.send(&ctx(), change).await.unwrap();

        let partition = partition_for_key(&message_key(ProductId::UNASSIGNED), 3);
        let records = log.records(partition);
        assert_eq!(records.len(), 1);
        assert_eq!(log.len(), 1);

        let record = &records[0];
        assert_eq!(record.key, "product-0");
        assert_eq!(record.headers.event_type, "product_created");
        assert_eq!(record.headers.producer_id, producer.producer_id());

        let decoded = EventEnvelope::decode(&record.payload).unwrap();
        assert_eq!(decoded.event_id(), envelope.event_id());
        assert_eq!(decoded.kind(), EventKind::Created);
        assert!(decoded.product_data().is_some());
    }

    #[tokio::test]
    async fn deleted_event_carries_no_snapshot() {
        let (log, producer) = setup(1);
        producer
            .send(&ctx(), ProductChange::Deleted(ProductId::new(8)))
            .await
            .unwrap();
        let decoded = EventEnvelope::decode(&log.records(0)[0].payload).unwrap();
        assert_eq!(decoded.kind(), EventKind::Deleted);
        assert_eq!(decoded.product_id(), ProductId::new(8));
        assert!(decoded.product_data().is_none());
    }

    #[tokio::test]
    async fn same_product_events_share_a_partition_in_send_order() {
        let (log, producer) = setup(4);
        let id = ProductId::new(17);
        for name in ["a", "b", "c"] {
            producer
                .send(&ctx(), ProductChange::Updated(ProductSnapshot::new(id, data(name))))
                .await
                .unwrap();
        }

        let partition = partition_for_key(&message_key(id), 4);
        let names: Vec<_> = log
            .records(partition)
            .iter()
            .map(|r| {
                EventEnvelope::decode(&r.payload)
                    .unwrap()
                    .into_product_data()
                    .unwrap()
                    .data
                    .name
            })
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn sequences_strictly_increase() {
        let (_log, producer) = setup(1);
        let mut last = 0;
        for _ in 0..50 {
            let env = producer
                .send(&ctx(), ProductChange::Deleted(ProductId::new(1)))
                .await
                .unwrap();
            assert!(env.sequence() > last);
            last = env.sequence();
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let (log, producer) = setup(1);
        log.fail_next_appends(2);
        producer
            .send(&ctx(), ProductChange::Deleted(ProductId::new(1)))
            .await
            .unwrap();
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_the_failure() {
        let (log, producer) = setup(1);
        log.fail_next_appends(3);
        let err = producer
            .send(&ctx(), ProductChange::Deleted(ProductId::new(1)))
            .await
            .unwrap_err();
        match err {
            ProduceError::Log { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(source.is_transient());
            }
            other => panic!("expected log failure, got {other:?}"),
        }
        assert!(log.is_empty());
    }
}
