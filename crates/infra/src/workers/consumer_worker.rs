use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::consumer::{ConsumerError, ProductEventConsumer};

/// Handle to control and join a spawned consumer loop.
#[derive(Debug)]
pub struct ConsumerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<Result<(), ConsumerError>>,
}

impl ConsumerHandle {
    /// Resolves when the loop exits on its own, which only happens on a
    /// fatal error.
    pub async fn stopped(&mut self) -> Result<(), ConsumerError> {
        flatten(&mut self.join).await
    }

    /// Signals shutdown and waits up to `grace` for the current cycle to end.
    pub async fn shutdown(mut self, grace: Duration) -> Result<(), ConsumerError> {
        let _ = self.shutdown.send(true);
        match tokio::time::timeout(grace, flatten(&mut self.join)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(?grace, "consumer did not stop within grace period, aborting");
                self.join.abort();
                Ok(())
            }
        }
    }
}

async fn flatten(join: &mut JoinHandle<Result<(), ConsumerError>>) -> Result<(), ConsumerError> {
    match join.await {
        Ok(result) => result,
        Err(err) => Err(ConsumerError::Crashed(err.to_string())),
    }
}

/// Spawns consumer loops on the tokio runtime.
#[derive(Debug)]
pub struct ConsumerWorker;

impl ConsumerWorker {
    pub fn spawn(consumer: ProductEventConsumer) -> ConsumerHandle {
        let (shutdown, rx) = watch::channel(false);
        let join = tokio::spawn(consumer.run(rx));
        ConsumerHandle { shutdown, join }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::InMemoryProductCache;
    use crate::consumer::ConsumerSettings;
    use crate::store::InMemoryProductStore;
    use shelfline_events::{FetchOptions, InMemoryEventLog};

    fn consumer(log: Arc<InMemoryEventLog>) -> ProductEventConsumer {
        ProductEventConsumer::new(
            log,
            Arc::new(InMemoryProductStore::new()),
            Arc::new(InMemoryProductCache::new(Duration::from_secs(60))),
            ConsumerSettings {
                group: "g".to_string(),
                partitions: vec![0],
                fetch: FetchOptions {
                    max_wait: Duration::from_millis(10),
                    ..FetchOptions::default()
                },
                retry_backoff: Duration::from_millis(10),
            },
        )
    }

    #[tokio::test]
    async fn shutdown_joins_the_loop() {
        let handle = ConsumerWorker::spawn(consumer(Arc::new(InMemoryEventLog::new("t", 1))));
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.shutdown(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn stopped_reports_fatal_errors() {
        let log = Arc::new(InMemoryEventLog::new("t", 1));
        log.fail_next_fetch();
        let mut handle = ConsumerWorker::spawn(consumer(log));
        let result = tokio::time::timeout(Duration::from_secs(5), handle.stopped())
            .await
            .unwrap();
        assert!(matches!(result, Err(ConsumerError::Fetch(_))));
    }
}
