//! Apply-and-commit consumer for product events.
//!
//! The read position of every owned partition is its committed offset. A
//! record is committed only after it was applied to the store (or skipped as
//! undecodable), so an apply failure makes the same record come back on the
//! next fetch, in this process or after a restart.
//!
//! A partition whose record failed is left out of fetches until its
//! `retry_backoff` has elapsed. The other partitions keep flowing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};

use shelfline_core::ErrorKind;
use shelfline_events::{
    DecodeError, EventEnvelope, EventKind, EventLog, FetchOptions, LogError, LogRecord, Offset,
};

use crate::cache::ProductCache;
use crate::config::ConsumerConfig;
use crate::store::{ProductStore, StoreError};

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("{0} event has no product snapshot")]
    MissingSnapshot(EventKind),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApplyError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Apply
    }
}

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("failed to load committed offsets: {0}")]
    Position(#[source] LogError),

    #[error("fetch failed: {0}")]
    Fetch(#[source] LogError),

    #[error("commit of partition {partition} at {offset} failed: {source}")]
    Commit {
        partition: u32,
        offset: Offset,
        #[source]
        source: LogError,
    },

    #[error("consumer task ended abnormally: {0}")]
    Crashed(String),
}

/// Which partitions to read and how to batch.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub group: String,
    pub partitions: Vec<u32>,
    pub fetch: FetchOptions,
    pub retry_backoff: Duration,
}

impl ConsumerSettings {
    pub fn from_config(cfg: &ConsumerConfig, total_partitions: u32) -> Self {
        Self {
            group: cfg.group.clone(),
            partitions: cfg
                .partitions
                .clone()
                .unwrap_or_else(|| (0..total_partitions).collect()),
            fetch: FetchOptions {
                max_wait: cfg.max_wait,
                max_records: cfg.max_records,
                max_bytes: cfg.max_bytes,
            },
            retry_backoff: cfg.retry_backoff,
        }
    }
}

/// Outcome counts of one fetch cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum Outcome {
    Applied,
    Skipped,
    Failed,
}

pub struct ProductEventConsumer {
    log: Arc<dyn EventLog>,
    store: Arc<dyn ProductStore>,
    cache: Arc<dyn ProductCache>,
    settings: ConsumerSettings,
    positions: Option<BTreeMap<u32, Offset>>,
    backoff: HashMap<u32, Instant>,
}

impl std::fmt::Debug for ProductEventConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductEventConsumer")
            .field("topic", &self.log.topic())
            .field("settings", &self.settings)
            .field("positions", &self.positions)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl ProductEventConsumer {
    pub fn new(
        log: Arc<dyn EventLog>,
        store: Arc<dyn ProductStore>,
        cache: Arc<dyn ProductCache>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            log,
            store,
            cache,
            settings,
            positions: None,
            backoff: HashMap::new(),
        }
    }

    async fn load_positions(&mut self) -> Result<Vec<(u32, Offset)>, ConsumerError> {
        if self.positions.is_none() {
            let mut positions = BTreeMap::new();
            for &partition in &self.settings.partitions {
                let offset = self
                    .log
                    .committed(&self.settings.group, partition)
                    .await
                    .map_err(ConsumerError::Position)?;
                positions.insert(partition, offset);
            }
            info!(group = %self.settings.group, ?positions, "resuming from committed offsets");
            self.positions = Some(positions);
        }

        Ok(self
            .positions
            .iter()
            .flatten()
            .map(|(p, o)| (*p, *o))
            .collect())
    }

    /// Earliest time a partition comes out of backoff, when every owned
    /// partition is currently backing off.
    pub fn resume_at(&self) -> Option<Instant> {
        let now = Instant::now();
        let mut earliest: Option<Instant> = None;
        for partition in &self.settings.partitions {
            let until = self.backoff.get(partition).filter(|until| **until > now)?;
            earliest = Some(earliest.map_or(*until, |e| e.min(*until)));
        }
        earliest
    }

    /// Runs one `Fetching → Applying → Committing` cycle.
    ///
    /// After a failed apply the rest of that partition's batch is left
    /// untouched so nothing past the failed offset is committed, and the
    /// partition sits out fetches for `retry_backoff`.
    pub async fn poll_once(&mut self) -> Result<CycleReport, ConsumerError> {
        let mut positions = self.load_positions().await?;

        if !self.backoff.is_empty() {
            let now = Instant::now();
            self.backoff.retain(|_, until| *until > now);
            positions.retain(|(partition, _)| !self.backoff.contains_key(partition));
            if positions.is_empty() {
                debug!("all partitions backing off");
                return Ok(CycleReport::default());
            }
        }

        debug!(state = "fetching", partitions = positions.len());
        let batch = self
            .log
            .fetch(&positions, &self.settings.fetch)
            .await
            .map_err(ConsumerError::Fetch)?;

        let mut report = CycleReport {
            fetched: batch.len(),
            ..CycleReport::default()
        };
        let mut blocked = HashSet::new();

        for record in batch {
            if blocked.contains(&record.partition) {
                continue;
            }

            let span = info_span!(
                "record",
                partition = record.partition,
                offset = %record.offset,
                event_id = tracing::field::Empty
            );
            match self.process(&record).instrument(span.clone()).await {
                Outcome::Applied => report.applied += 1,
                Outcome::Skipped => report.skipped += 1,
                Outcome::Failed => {
                    report.failed += 1;
                    blocked.insert(record.partition);
                    self.backoff.insert(
                        record.partition,
                        Instant::now() + self.settings.retry_backoff,
                    );
                    continue;
                }
            }

            self.commit(record.partition, record.offset)
                .instrument(span)
                .await?;
        }

        if report.fetched > 0 {
            debug!(?report, "cycle finished");
        }
        Ok(report)
    }

    async fn commit(&mut self, partition: u32, offset: Offset) -> Result<(), ConsumerError> {
        debug!(state = "committing");
        self.log
            .commit(&self.settings.group, partition, offset)
            .await
            .map_err(|source| ConsumerError::Commit {
                partition,
                offset,
                source,
            })?;
        if let Some(positions) = self.positions.as_mut() {
            positions.insert(partition, offset);
        }
        Ok(())
    }

    async fn process(&self, record: &LogRecord) -> Outcome {
        let envelope = match decode(record) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(kind = %err.kind(), error = %err, "skipping undecodable record");
                return Outcome::Skipped;
            }
        };
        tracing::Span::current().record("event_id", tracing::field::display(envelope.event_id()));

        debug!(
            state = "applying",
            event_type = %envelope.kind(),
            producer_id = envelope.producer_id(),
            event_time = %envelope.timestamp()
        );
        match self.apply(&envelope).await {
            Ok(()) => Outcome::Applied,
            Err(err) => {
                error!(
                    kind = %err.kind(),
                    event_type = %envelope.kind(),
                    product_id = %envelope.product_id(),
                    error = %err,
                    "apply failed, offset not committed"
                );
                Outcome::Failed
            }
        }
    }

    async fn apply(&self, envelope: &EventEnvelope) -> Result<(), ApplyError> {
        match envelope.kind() {
            EventKind::Created => {
                let snapshot = envelope
                    .product_data()
                    .ok_or(ApplyError::MissingSnapshot(EventKind::Created))?;
                let product = self.store.create(&snapshot.data).await?;
                info!(product_id = %product.id, "product created");
                if let Err(err) = self.cache.set(&product).await {
                    warn!(product_id = %product.id, error = %err, "cache refresh failed");
                }
            }
            EventKind::Updated => {
                let snapshot = envelope
                    .product_data()
                    .ok_or(ApplyError::MissingSnapshot(EventKind::Updated))?;
                let product = self
                    .store
                    .update(envelope.product_id(), &snapshot.data)
                    .await?;
                info!(product_id = %product.id, "product updated");
                if let Err(err) = self.cache.set(&product).await {
                    warn!(product_id = %product.id, error = %err, "cache refresh failed");
                }
            }
            EventKind::Deleted => {
                let id = envelope.product_id();
                match self.store.delete(id).await {
                    Ok(()) => info!(product_id = %id, "product deleted"),
                    Err(StoreError::NotFound(_)) => {
                        debug!(product_id = %id, "product already absent")
                    }
                    Err(err) => return Err(err.into()),
                }
                if let Err(err) = self.cache.delete(id).await {
                    warn!(product_id = %id, error = %err, "cache eviction failed");
                }
            }
        }
        Ok(())
    }

    /// Polls until `shutdown` turns true or a fatal error occurs.
    ///
    /// Shutdown is observed between cycles; an in-flight fetch is not
    /// interrupted.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ConsumerError> {
        info!(
            topic = %self.log.topic(),
            group = %self.settings.group,
            partitions = ?self.settings.partitions,
            "consumer started"
        );

        while !*shutdown.borrow() {
            if let Err(err) = self.poll_once().await {
                error!(error = %err, "consumer stopped on fatal error");
                return Err(err);
            }

            if let Some(until) = self.resume_at() {
                tokio::select! {
                    _ = tokio::time::sleep_until(until) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }

        info!("consumer stopped");
        Ok(())
    }
}

fn decode(record: &LogRecord) -> Result<EventEnvelope, DecodeError> {
    let envelope = EventEnvelope::decode(&record.payload)?;
    let headers = [
        ("event_type", record.headers.event_type.as_str(), envelope.kind().as_str()),
        ("producer_id", record.headers.producer_id.as_str(), envelope.producer_id()),
    ];
    for (header, found, expected) in headers {
        if !found.is_empty() && found != expected {
            return Err(DecodeError::HeaderMismatch {
                header,
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
    }
    Ok(envelope)
}
