//! Process configuration loaded from environment variables.
//!
//! Every key has a default. Values that are present but malformed are a
//! [`ConfigError`] naming the key rather than a silent fallback.

use std::str::FromStr;
use std::time::Duration;

use redis::{ConnectionInfo, IntoConnectionInfo, RedisResult};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value `{value}` for {key}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    /// Bound on reading a request body.
    pub read_timeout: Duration,
    /// Bound on producing a response.
    pub write_timeout: Duration,
    pub shutdown_grace: Duration,
    /// Global requests per second.
    pub rate_limit: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub ssl_mode: String,
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
}

impl DatabaseConfig {
    /// Idle connections kept warm, never above the pool maximum.
    pub fn min_connections(&self) -> u32 {
        self.max_idle_conns.min(self.max_open_conns)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    pub addrs: Vec<String>,
    pub topic: String,
    pub partitions: u32,
    pub enable_tls: bool,
    pub required_replicas: u32,
    pub replica_timeout: Duration,
}

impl BrokerConfig {
    /// Connection URL for the first configured broker address.
    pub fn url(&self) -> String {
        let scheme = if self.enable_tls { "rediss" } else { "redis" };
        let addr = self
            .addrs
            .first()
            .map(String::as_str)
            .unwrap_or("localhost:6379");
        format!("{scheme}://{addr}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProducerConfig {
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerConfig {
    pub group: String,
    /// Owned partitions; `None` means all of them.
    pub partitions: Option<Vec<u32>>,
    pub max_wait: Duration,
    pub max_records: usize,
    pub max_bytes: usize,
    /// Pause after an apply failure before the record is fetched again.
    pub retry_backoff: Duration,
    pub shutdown_grace: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group: "product-processor".to_string(),
            partitions: None,
            max_wait: Duration::from_millis(100),
            max_records: 100,
            max_bytes: 10 * 1024 * 1024,
            retry_backoff: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedisConfig {
    pub addr: String,
    pub password: String,
    pub db: i64,
    pub ttl: Duration,
}

impl RedisConfig {
    /// Connection parameters for the cache. The password is set as a field
    /// and never spliced into a URL.
    pub fn connection_info(&self) -> RedisResult<ConnectionInfo> {
        let mut info = format!("redis://{}", self.addr)
            .as_str()
            .into_connection_info()?;
        info.redis.db = self.db;
        info.redis.password = (!self.password.is_empty()).then(|| self.password.clone());
        Ok(info)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub broker: BrokerConfig,
    pub producer: ProducerConfig,
    pub consumer: ConsumerConfig,
    pub redis: RedisConfig,
    /// Run the API against in-memory collaborators with an embedded consumer.
    pub in_memory: bool,
}

const SSL_MODES: [&str; 6] = [
    "disable",
    "allow",
    "prefer",
    "require",
    "verify-ca",
    "verify-full",
];

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let consumer_defaults = ConsumerConfig::default();
        let producer_defaults = ProducerConfig::default();

        let server = ServerConfig {
            port: env.parse("SERVER_PORT", 8080)?,
            read_timeout: env.duration("SERVER_READ_TIMEOUT", Duration::from_secs(30))?,
            write_timeout: env.duration("SERVER_WRITE_TIMEOUT", Duration::from_secs(30))?,
            shutdown_grace: env.duration("SERVER_SHUTDOWN_GRACE", Duration::from_secs(30))?,
            rate_limit: env.positive("RATE_LIMIT", 10)?,
        };

        let ssl_mode = env.string("DB_SSL_MODE", "disable");
        if !SSL_MODES.contains(&ssl_mode.as_str()) {
            return Err(ConfigError {
                key: "DB_SSL_MODE",
                value: ssl_mode,
                reason: format!("expected one of {}", SSL_MODES.join(", ")),
            });
        }
        let database = DatabaseConfig {
            host: env.string("DB_HOST", "localhost"),
            port: env.parse("DB_PORT", 5432)?,
            user: env.string("DB_USER", "postgres"),
            password: env.string("DB_PASSWORD", "password"),
            name: env.string("DB_NAME", "products"),
            ssl_mode,
            max_open_conns: env.positive("DB_MAX_OPEN_CONNS", 25)?,
            max_idle_conns: env.parse("DB_MAX_IDLE_CONNS", 25)?,
        };

        let broker = BrokerConfig {
            addrs: env.list("BROKER_ADDRS", &["localhost:6379"]),
            topic: env.string("BROKER_TOPIC", "products"),
            partitions: env.positive("BROKER_PARTITIONS", 3)?,
            enable_tls: env.bool("BROKER_ENABLE_TLS", false)?,
            required_replicas: env.parse("BROKER_REQUIRED_REPLICAS", 0)?,
            replica_timeout: env.duration("BROKER_REPLICA_TIMEOUT", Duration::from_secs(1))?,
        };

        let producer = ProducerConfig {
            max_attempts: env.positive("PRODUCER_MAX_ATTEMPTS", producer_defaults.max_attempts)?,
            retry_backoff: env.duration("PRODUCER_RETRY_BACKOFF", producer_defaults.retry_backoff)?,
        };

        let consumer = ConsumerConfig {
            group: env.string("CONSUMER_GROUP", &consumer_defaults.group),
            partitions: env.partitions("CONSUMER_PARTITIONS", broker.partitions)?,
            max_wait: env.positive_duration("CONSUMER_MAX_WAIT", consumer_defaults.max_wait)?,
            max_records: env.positive("CONSUMER_MAX_RECORDS", consumer_defaults.max_records)?,
            max_bytes: env.positive("CONSUMER_MAX_BYTES", consumer_defaults.max_bytes)?,
            retry_backoff: env.duration("CONSUMER_RETRY_BACKOFF", consumer_defaults.retry_backoff)?,
            shutdown_grace: env.duration(
                "PROCESSOR_SHUTDOWN_GRACE",
                consumer_defaults.shutdown_grace,
            )?,
        };

        let redis = RedisConfig {
            addr: env.string("REDIS_ADDR", "localhost:6379"),
            password: env.string("REDIS_PASSWORD", ""),
            db: env.parse("REDIS_DB", 0)?,
            ttl: env.duration("REDIS_TTL", Duration::from_secs(5 * 60))?,
        };

        Ok(Self {
            server,
            database,
            broker,
            producer,
            consumer,
            redis,
            in_memory: env.bool("SHELFLINE_IN_MEMORY", false)?,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    fn list(&self, key: &str, default: &[&str]) -> Vec<String> {
        match self.raw(key) {
            Some(v) => v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None => default.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw(key) {
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError {
                key,
                reason: e.to_string(),
                value,
            }),
            None => Ok(default),
        }
    }

    fn positive<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Default,
        T::Err: std::fmt::Display,
    {
        let value = self.parse(key, default)?;
        if value <= T::default() {
            return Err(ConfigError {
                key,
                value: self.raw(key).unwrap_or_default(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(value)
    }

    fn bool(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.raw(key) {
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError {
                    key,
                    value,
                    reason: "expected a boolean".to_string(),
                }),
            },
            None => Ok(default),
        }
    }

    fn duration(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        match self.raw(key) {
            Some(value) => parse_duration(&value).map_err(|reason| ConfigError {
                key,
                value,
                reason,
            }),
            None => Ok(default),
        }
    }

    fn positive_duration(
        &self,
        key: &'static str,
        default: Duration,
    ) -> Result<Duration, ConfigError> {
        let value = self.duration(key, default)?;
        if value.is_zero() {
            return Err(ConfigError {
                key,
                value: self.raw(key).unwrap_or_default(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(value)
    }

    fn partitions(&self, key: &'static str, total: u32) -> Result<Option<Vec<u32>>, ConfigError> {
        let Some(value) = self.raw(key) else {
            return Ok(None);
        };
        if value.eq_ignore_ascii_case("all") {
            return Ok(None);
        }

        let mut partitions = Vec::new();
        for part in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let partition: u32 = part.parse().map_err(|_| ConfigError {
                key,
                value: value.clone(),
                reason: format!("`{part}` is not a partition number"),
            })?;
            if partition >= total {
                return Err(ConfigError {
                    key,
                    value: value.clone(),
                    reason: format!("partition {partition} does not exist (topic has {total})"),
                });
            }
            if !partitions.contains(&partition) {
                partitions.push(partition);
            }
        }
        partitions.sort_unstable();
        Ok(Some(partitions))
    }
}

/// Parses `250ms`, `30s`, `5m` or `1h`.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| "missing unit (ms, s, m, h)".to_string())?;
    let (amount, unit) = value.split_at(split);
    let amount: u64 = amount
        .parse()
        .map_err(|_| "expected a whole number followed by a unit".to_string())?;

    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(amount.saturating_mul(3600))),
        other => Err(format!("unknown unit `{other}`")),
    }
}
