//! Broker-backed implementations of the partitioned event log.

pub mod redis_streams;

pub use redis_streams::{RedisStreamsEventLog, RedisStreamsSettings};
