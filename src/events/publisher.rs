//! Background relay from the outbox table to a Redis stream.
//!
//! Without Redis the relay still runs and marks events published, so the
//! outbox does not grow without bound.

use deadpool_redis::{Config as RedisPoolConfig, Pool as RedisPool, Runtime};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use crate::config::RedisConfig;
use crate::models::OutboxEvent;
use crate::DbPool;

use super::outbox::OutboxService;

pub fn create_redis_pool(config: &RedisConfig) -> Option<RedisPool> {
    let url = config.url.as_ref()?;
    let timeout = Duration::from_secs(config.connection_timeout_secs);

    let pool = RedisPoolConfig::from_url(url)
        .builder()
        .map_err(|e| warn!(error = %e, "Invalid Redis configuration"))
        .ok()?
        .max_size(config.pool_size)
        .wait_timeout(Some(timeout))
        .create_timeout(Some(timeout))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| warn!(error = %e, "Failed to build Redis pool"))
        .ok()?;

    info!(
        redis_host = %url.rsplit('@').next().unwrap_or("***"),
        "Redis pool created"
    );
    Some(pool)
}

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub stream_name: String,
    pub retention_days: i64,
    /// Purge old events every this many polls.
    pub cleanup_every: u32,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 100,
            stream_name: "boardroom:events".to_string(),
            retention_days: 7,
            cleanup_every: 3600,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Task error: {0}")]
    Task(String),
}

/// Shutdown side of a running publisher.
pub struct PublisherHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PublisherHandle {
    /// Signals the loop and waits for the final drain.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Event publisher task failed");
        }
    }
}

pub struct EventPublisher {
    db_pool: DbPool,
    redis_pool: Option<RedisPool>,
    config: PublisherConfig,
}

impl EventPublisher {
    pub fn new(db_pool: DbPool, redis_pool: Option<RedisPool>, config: PublisherConfig) -> Self {
        Self {
            db_pool,
            redis_pool,
            config,
        }
    }

    pub fn spawn(self) -> PublisherHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        PublisherHandle { shutdown, task }
    }

    #[instrument(skip_all, name = "event_publisher")]
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            stream = %self.config.stream_name,
            redis = self.redis_pool.is_some(),
            "Event publisher started"
        );

        let mut ticker = interval(self.config.poll_interval);
        let mut polls: u32 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    polls = polls.wrapping_add(1);

                    if let Err(e) = self.poll_and_publish().await {
                        error!(error = %e, "Failed to relay outbox events");
                    }

                    if self.config.cleanup_every > 0 && polls % self.config.cleanup_every == 0 {
                        if let Err(e) = self.cleanup().await {
                            warn!(error = %e, "Outbox cleanup failed");
                        }
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Draining outbox before shutdown");
        for _ in 0..3 {
            match self.poll_and_publish().await {
                Ok(0) => break,
                Ok(n) => debug!(count = n, "Drained events"),
                Err(e) => {
                    error!(error = %e, "Final drain failed");
                    break;
                }
            }
        }

        info!("Event publisher stopped");
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, PublishError>
    where
        T: Send + 'static,
        F: FnOnce(&mut diesel::PgConnection) -> Result<T, diesel::result::Error> + Send + 'static,
    {
        let pool = self.db_pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| PublishError::Database(e.to_string()))?;
            f(&mut conn).map_err(|e| PublishError::Database(e.to_string()))
        })
        .await
        .map_err(|e| PublishError::Task(e.to_string()))?
    }

    async fn poll_and_publish(&self) -> Result<usize, PublishError> {
        let batch_size = self.config.batch_size;
        let events = self
            .with_conn(move |conn| OutboxService::fetch_unpublished(conn, batch_size))
            .await?;

        if events.is_empty() {
            return Ok(0);
        }

        if let Some(redis_pool) = &self.redis_pool {
            self.publish_to_redis(redis_pool, &events).await?;
        }

        let ids: Vec<_> = events.iter().map(|e| e.id).collect();
        self.with_conn(move |conn| OutboxService::mark_published_batch(conn, &ids))
            .await?;

        debug!(count = events.len(), "Relayed outbox events");
        Ok(events.len())
    }

    async fn publish_to_redis(
        &self,
        redis_pool: &RedisPool,
        events: &[OutboxEvent],
    ) -> Result<(), PublishError> {
        use redis::AsyncCommands;

        let mut conn = redis_pool
            .get()
            .await
            .map_err(|e| PublishError::Redis(e.to_string()))?;

        for event in events {
            let body = stream_entry(event).to_string();
            let _: String = conn
                .xadd(
                    &self.config.stream_name,
                    "*",
                    &[("event_type", event.event_type.as_str()), ("data", &body)],
                )
                .await
                .map_err(|e| PublishError::Redis(e.to_string()))?;
        }

        Ok(())
    }

    async fn cleanup(&self) -> Result<usize, PublishError> {
        let retention_days = self.config.retention_days;
        self.with_conn(move |conn| OutboxService::cleanup_old_events(conn, retention_days))
            .await
    }
}

fn stream_entry(event: &OutboxEvent) -> serde_json::Value {
    serde_json::json!({
        "id": event.id.to_string(),
        "event_type": event.event_type,
        "aggregate_type": event.aggregate_type,
        "aggregate_id": event.aggregate_id,
        "payload": event.payload,
        "created_at": event.created_at.and_utc().to_rfc3339(),
    })
}

pub struct EventPublisherBuilder {
    db_pool: DbPool,
    redis_pool: Option<RedisPool>,
    config: PublisherConfig,
}

impl EventPublisherBuilder {
    pub fn new(db_pool: DbPool) -> Self {
        Self {
            db_pool,
            redis_pool: None,
            config: PublisherConfig::default(),
        }
    }

    pub fn maybe_redis_pool(mut self, pool: Option<RedisPool>) -> Self {
        self.redis_pool = pool;
        self
    }

    pub fn stream_name(mut self, name: impl Into<String>) -> Self {
        self.config.stream_name = name.into();
        self
    }

    pub fn poll_interval(mut self, duration: Duration) -> Self {
        self.config.poll_interval = duration;
        self
    }

    pub fn build(self) -> EventPublisher {
        EventPublisher::new(self.db_pool, self.redis_pool, self.config)
    }

    pub fn spawn(self) -> PublisherHandle {
        self.build().spawn()
    }
}
