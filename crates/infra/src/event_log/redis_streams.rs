//! Redis Streams-backed partitioned event log.
//!
//! ## Layout
//!
//! - **Partitions**: one stream per partition, `{topic}:{partition}`
//! - **Entries**: fields `key`, `event_type`, `producer_id`, `payload`
//! - **Offsets**: the stream entry id (`{millis}-{seq}`)
//! - **Committed positions**: hash `{topic}:offsets:{group}`, field = partition
//!
//! Reads use plain `XREAD` from the committed position rather than consumer
//! groups: a record is re-read until its offset is committed, which gives
//! at-least-once delivery across restarts without pending-entry bookkeeping.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::StreamReadReply;
use tracing::{debug, instrument};

use crate::config::BrokerConfig;

use shelfline_events::{
    AppendAck, EventLog, FetchOptions, LogError, LogRecord, Offset, OutgoingRecord,
    RecordHeaders, truncate_to_bytes,
};

/// Connection and durability settings.
#[derive(Debug, Clone)]
pub struct RedisStreamsSettings {
    pub url: String,
    pub topic: String,
    pub partitions: u32,
    /// Replicas that must confirm each append (`WAIT`); 0 trusts the primary.
    pub required_replicas: u32,
    pub replica_timeout: Duration,
}

impl RedisStreamsSettings {
    pub fn from_config(cfg: &BrokerConfig) -> Self {
        Self {
            url: cfg.url(),
            topic: cfg.topic.clone(),
            partitions: cfg.partitions,
            required_replicas: cfg.required_replicas,
            replica_timeout: cfg.replica_timeout,
        }
    }
}

#[derive(Clone)]
pub struct RedisStreamsEventLog {
    conn: ConnectionManager,
    topic: String,
    partitions: u32,
    required_replicas: u32,
    replica_timeout: Duration,
}

impl std::fmt::Debug for RedisStreamsEventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStreamsEventLog")
            .field("topic", &self.topic)
            .field("partitions", &self.partitions)
            .field("required_replicas", &self.required_replicas)
            .finish_non_exhaustive()
    }
}

impl RedisStreamsEventLog {
    pub async fn connect(settings: RedisStreamsSettings) -> Result<Self, LogError> {
        let client = redis::Client::open(settings.url.as_str())
            .map_err(|e| map_redis_error("open", e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| map_redis_error("connect", e))?;

        Ok(Self {
            conn,
            topic: settings.topic,
            partitions: settings.partitions.max(1),
            required_replicas: settings.required_replicas,
            replica_timeout: settings.replica_timeout,
        })
    }

    fn stream_key(&self, partition: u32) -> String {
        stream_key(&self.topic, partition)
    }

    fn offsets_key(&self, group: &str) -> String {
        format!("{}:offsets:{}", self.topic, group)
    }

    fn check_partition(&self, partition: u32) -> Result<(), LogError> {
        if partition < self.partitions {
            Ok(())
        } else {
            Err(LogError::UnknownPartition {
                partition,
                partitions: self.partitions,
            })
        }
    }

    async fn wait_for_replicas(&self) -> Result<(), LogError> {
        if self.required_replicas == 0 {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let acked: u32 = redis::cmd("WAIT")
            .arg(self.required_replicas)
            .arg(u64::try_from(self.replica_timeout.as_millis()).unwrap_or(u64::MAX))
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("WAIT", e))?;

        if acked < self.required_replicas {
            return Err(LogError::NotReplicated {
                required: self.required_replicas,
                acked,
            });
        }
        Ok(())
    }
}

fn stream_key(topic: &str, partition: u32) -> String {
    format!("{topic}:{partition}")
}

fn map_redis_error(operation: &str, err: redis::RedisError) -> LogError {
    let msg = format!("{operation} failed: {err}");
    if err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_timeout()
    {
        LogError::Unavailable(msg)
    } else {
        LogError::Protocol(msg)
    }
}

fn parse_offset(id: &str) -> Result<Offset, LogError> {
    id.parse()
        .map_err(|e| LogError::Protocol(format!("stream returned {e}")))
}

#[async_trait]
impl EventLog for RedisStreamsEventLog {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn partitions(&self) -> u32 {
        self.partitions
    }

    /// `XADD` returns once the primary applied the entry; `WAIT` then covers
    /// the configured replicas.
    #[instrument(skip(self, record), fields(topic = %self.topic, key = %record.key), err)]
    async fn append(
        &self,
        partition: u32,
        record: OutgoingRecord,
    ) -> Result<AppendAck, LogError> {
        self.check_partition(partition)?;

        let mut conn = self.conn.clone();
        let id: String = redis::cmd("XADD")
            .arg(self.stream_key(partition))
            .arg("*")
            .arg("key")
            .arg(&record.key)
            .arg("event_type")
            .arg(&record.headers.event_type)
            .arg("producer_id")
            .arg(&record.headers.producer_id)
            .arg("payload")
            .arg(&record.payload[..])
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("XADD", e))?;

        self.wait_for_replicas().await?;

        Ok(AppendAck {
            partition,
            offset: parse_offset(&id)?,
        })
    }

    async fn fetch(
        &self,
        positions: &[(u32, Offset)],
        options: &FetchOptions,
    ) -> Result<Vec<LogRecord>, LogError> {
        if positions.is_empty() {
            return Ok(Vec::new());
        }

        let mut partition_by_key = HashMap::with_capacity(positions.len());
        for (partition, _) in positions {
            self.check_partition(*partition)?;
            partition_by_key.insert(self.stream_key(*partition), *partition);
        }

        let mut cmd = redis::cmd("XREAD");
        // COUNT applies per stream.
        cmd.arg("COUNT")
            .arg(options.per_partition_limit(positions.len()));
        if !options.max_wait.is_zero() {
            cmd.arg("BLOCK")
                .arg(u64::try_from(options.max_wait.as_millis()).unwrap_or(u64::MAX));
        }
        cmd.arg("STREAMS");
        for (partition, _) in positions {
            cmd.arg(self.stream_key(*partition));
        }
        for (_, offset) in positions {
            cmd.arg(offset.to_string());
        }

        let mut conn = self.conn.clone();
        let reply: Option<StreamReadReply> = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("XREAD", e))?;

        let mut by_partition: HashMap<u32, Vec<LogRecord>> = HashMap::new();
        for stream in reply.map(|r| r.keys).unwrap_or_default() {
            let Some(&partition) = partition_by_key.get(&stream.key) else {
                continue;
            };
            let records = by_partition.entry(partition).or_default();
            for entry in stream.ids {
                // Missing fields surface as decode failures downstream.
                records.push(LogRecord {
                    partition,
                    offset: parse_offset(&entry.id)?,
                    key: entry.get("key").unwrap_or_default(),
                    headers: RecordHeaders {
                        event_type: entry.get("event_type").unwrap_or_default(),
                        producer_id: entry.get("producer_id").unwrap_or_default(),
                    },
                    payload: entry.get("payload").unwrap_or_default(),
                });
            }
        }

        let mut batch: Vec<LogRecord> = positions
            .iter()
            .filter_map(|(partition, _)| by_partition.remove(partition))
            .flatten()
            .collect();
        batch.truncate(options.max_records);
        truncate_to_bytes(&mut batch, options.max_bytes);

        debug!(topic = %self.topic, records = batch.len(), "fetched batch");
        Ok(batch)
    }

    #[instrument(skip(self), fields(topic = %self.topic), err)]
    async fn commit(&self, group: &str, partition: u32, offset: Offset) -> Result<(), LogError> {
        self.check_partition(partition)?;
        let mut conn = self.conn.clone();
        redis::cmd("HSET")
            .arg(self.offsets_key(group))
            .arg(partition)
            .arg(offset.to_string())
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| map_redis_error("HSET", e))
    }

    async fn committed(&self, group: &str, partition: u32) -> Result<Offset, LogError> {
        self.check_partition(partition)?;
        let mut conn = self.conn.clone();
        let stored: Option<String> = redis::cmd("HGET")
            .arg(self.offsets_key(group))
            .arg(partition)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("HGET", e))?;

        match stored {
            Some(id) => parse_offset(&id),
            None => Ok(Offset::ZERO),
        }
    }

    async fn ping(&self) -> Result<(), LogError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| map_redis_error("PING", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_map_to_separate_streams() {
        assert_eq!(stream_key("products", 0), "products:0");
        assert_eq!(stream_key("products", 2), "products:2");
    }

    #[test]
    fn stream_ids_parse_as_offsets() {
        assert_eq!(parse_offset("1700000000000-0").unwrap(), Offset::new(1_700_000_000_000, 0));
        assert!(matches!(parse_offset("bogus"), Err(LogError::Protocol(_))));
    }

    #[test]
    fn settings_follow_broker_config() {
        let cfg = BrokerConfig {
            addrs: vec!["broker-a:6380".into(), "broker-b:6380".into()],
            topic: "catalog".into(),
            partitions: 6,
            enable_tls: true,
            required_replicas: 1,
            replica_timeout: Duration::from_millis(250),
        };

        let settings = RedisStreamsSettings::from_config(&cfg);
        assert_eq!(settings.url, "rediss://broker-a:6380");
        assert_eq!(settings.topic, "catalog");
        assert_eq!(settings.partitions, 6);
        assert_eq!(settings.required_replicas, 1);
    }
}
