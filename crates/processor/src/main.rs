//! Event processor: applies product events from the log to the store and cache.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use shelfline_infra::cache::RedisProductCache;
use shelfline_infra::event_log::{RedisStreamsEventLog, RedisStreamsSettings};
use shelfline_infra::store::{PostgresProductStore, connect_postgres};
use shelfline_infra::{
    Config, ConsumerSettings, ConsumerWorker, ProductEventConsumer, shutdown_signal,
};
use shelfline_observability::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shelfline_observability::init(LogFormat::from_env());

    let config = Config::from_env().context("invalid configuration")?;

    let pool = connect_postgres(&config.database)
        .await
        .context("failed to connect to postgres")?;
    let store = PostgresProductStore::new(pool);
    store
        .ensure_schema()
        .await
        .context("failed to ensure products schema")?;

    let redis_info = config
        .redis
        .connection_info()
        .context("invalid redis cache address")?;
    let cache = RedisProductCache::connect(redis_info, config.redis.ttl)
        .await
        .context("failed to connect to redis cache")?;

    let log = RedisStreamsEventLog::connect(RedisStreamsSettings::from_config(&config.broker))
        .await
        .context("failed to connect to event log")?;

    let settings = ConsumerSettings::from_config(&config.consumer, config.broker.partitions);
    let consumer = ProductEventConsumer::new(
        Arc::new(log),
        Arc::new(store),
        Arc::new(cache),
        settings,
    );

    let mut handle = ConsumerWorker::spawn(consumer);
    info!(group = %config.consumer.group, "processor started");

    let stopped = tokio::select! {
        result = handle.stopped() => Some(result),
        _ = shutdown_signal() => None,
    };

    match stopped {
        Some(Ok(())) => {
            info!("consumer exited");
            Ok(())
        }
        Some(Err(err)) => {
            error!(error = %err, "consumer failed");
            Err(err).context("consumer failed")
        }
        None => {
            handle
                .shutdown(config.consumer.shutdown_grace)
                .await
                .context("consumer failed during shutdown")?;
            info!("processor stopped");
            Ok(())
        }
    }
}
