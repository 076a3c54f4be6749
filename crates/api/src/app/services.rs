//! Collaborator wiring for the HTTP API.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use shelfline_events::{EventLog, InMemoryEventLog};
use shelfline_infra::cache::{InMemoryProductCache, ProductCache, RedisProductCache};
use shelfline_infra::config::ProducerConfig;
use shelfline_infra::event_log::{RedisStreamsEventLog, RedisStreamsSettings};
use shelfline_infra::store::{
    InMemoryProductStore, PostgresProductStore, ProductStore, connect_postgres,
};
use shelfline_infra::{
    Config, ConsumerHandle, ConsumerSettings, ConsumerWorker, EventProducer, ProductEventConsumer,
    ProductService,
};

/// Application services shared by every handler.
pub struct AppServices {
    pub products: ProductService,
    store: Arc<dyn ProductStore>,
    cache: Arc<dyn ProductCache>,
    log: Arc<dyn EventLog>,
}

impl std::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppServices")
            .field("products", &self.products)
            .finish_non_exhaustive()
    }
}

impl AppServices {
    pub fn new(
        store: Arc<dyn ProductStore>,
        cache: Arc<dyn ProductCache>,
        log: Arc<dyn EventLog>,
        producer: ProducerConfig,
    ) -> Self {
        let producer = Arc::new(EventProducer::new(log.clone(), producer));
        let products = ProductService::new(producer, store.clone(), cache.clone());
        Self {
            products,
            store,
            cache,
            log,
        }
    }

    pub async fn check_store(&self) -> Result<(), String> {
        self.store.ping().await.map_err(|e| e.to_string())
    }

    pub async fn check_cache(&self) -> Result<(), String> {
        self.cache.ping().await.map_err(|e| e.to_string())
    }

    pub async fn check_log(&self) -> Result<(), String> {
        self.log.ping().await.map_err(|e| e.to_string())
    }
}

/// Services plus the consumer embedded when running in-memory.
#[derive(Debug)]
pub struct Wiring {
    pub services: Arc<AppServices>,
    pub consumer: Option<ConsumerHandle>,
}

/// Connects the configured backends (or in-memory stand-ins).
pub async fn build_services(config: &Config) -> anyhow::Result<Wiring> {
    if config.in_memory {
        info!("running with in-memory store, cache and log");
        return Ok(in_memory(config));
    }

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

    let services = AppServices::new(
        Arc::new(store),
        Arc::new(cache),
        Arc::new(log),
        config.producer.clone(),
    );
    Ok(Wiring {
        services: Arc::new(services),
        consumer: None,
    })
}

/// In-memory collaborators with an embedded consumer.
///
/// Must be called from within a tokio runtime; the consumer is spawned on it.
pub fn in_memory(config: &Config) -> Wiring {
    let log: Arc<dyn EventLog> = Arc::new(InMemoryEventLog::new(
        config.broker.topic.clone(),
        config.broker.partitions,
    ));
    let store: Arc<dyn ProductStore> = Arc::new(InMemoryProductStore::new());
    let cache: Arc<dyn ProductCache> = Arc::new(InMemoryProductCache::new(config.redis.ttl));

    let consumer = ProductEventConsumer::new(
        log.clone(),
        store.clone(),
        cache.clone(),
        ConsumerSettings::from_config(&config.consumer, log.partitions()),
    );
    let handle = ConsumerWorker::spawn(consumer);

    Wiring {
        services: Arc::new(AppServices::new(store, cache, log, config.producer.clone())),
        consumer: Some(handle),
    }
}
