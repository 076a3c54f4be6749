//! Infrastructure layer: configuration, Postgres store, Redis cache and log,
//! and the producer/consumer/usecase wiring around them.

pub mod cache;
pub mod config;
pub mod consumer;
pub mod event_log;
pub mod producer;
pub mod service;
pub mod shutdown;
pub mod store;
pub mod workers;

pub use config::{Config, ConfigError};
pub use consumer::{ApplyError, ConsumerError, ConsumerSettings, CycleReport, ProductEventConsumer};
pub use producer::{EventProducer, ProduceError};
pub use service::{Accepted, ProductService, ServiceError};
pub use shutdown::shutdown_signal;
pub use workers::consumer_worker::{ConsumerHandle, ConsumerWorker};
