//! Service container for dependency injection.
//!
//! Owns every long-lived collaborator of the pipeline and drives its
//! lifecycle from startup checks to graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Result;
use crate::admission::{AdmissionController, CounterStore, InMemoryCounterStore, RedisCounterStore};
use crate::config::RouterConfig;
use crate::database::repositories::{InMemoryPreferenceStore, PreferenceStore, SqlxPreferenceStore};
use crate::database::{init_pool, run_migrations};
use crate::delivery::KafkaEmitter;
use crate::domain::Priority;
use crate::ingest::KafkaBandSource;
use crate::pipeline::{NotificationProcessor, PipelineStats, StatsSnapshot, run_pipeline};
use crate::routing::ChannelResolver;

/// Time allowed for queued deliveries to reach the broker at shutdown.
const PRODUCER_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ServiceContainer {
    config: RouterConfig,
    counter_store: Arc<dyn CounterStore>,
    preference_store: Arc<dyn PreferenceStore>,
    /// Present when preferences live in SQLite.
    pool: Option<SqlitePool>,
    stats: Arc<PipelineStats>,
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Connect the counter and preference stores.
    ///
    /// In mock mode both are in-memory and nothing external is contacted.
    pub async fn new(config: RouterConfig, cancellation_token: CancellationToken) -> Result<Self> {
        let (counter_store, preference_store, pool): (
            Arc<dyn CounterStore>,
            Arc<dyn PreferenceStore>,
            Option<SqlitePool>,
        ) = if config.mock_mode {
            warn!("Mock mode: using in-memory counter and preference stores");
            (
                Arc::new(InMemoryCounterStore::new()),
                Arc::new(InMemoryPreferenceStore::with_fallback(
                    InMemoryPreferenceStore::mock_matrix(),
                )),
                None,
            )
        } else {
            let counters = RedisCounterStore::connect(&config.counter_store).await?;
            let pool = init_pool(&config.database.url, config.database.max_connections).await?;
            run_migrations(&pool).await?;
            let preferences =
                SqlxPreferenceStore::new(pool.clone(), config.resolver.default_channels.clone());
            (Arc::new(counters), Arc::new(preferences), Some(pool))
        };

        Ok(Self {
            config,
            counter_store,
            preference_store,
            pool,
            stats: Arc::new(PipelineStats::new()),
            cancellation_token,
        })
    }

    /// Connect to the brokers and run the pipeline until shutdown.
    ///
    /// Fails without processing anything if any band consumer or the
    /// delivery producer cannot be established.
    pub async fn run(&self) -> Result<()> {
        let consumer_config = &self.config.kafka_consumer;

        let emitter = Arc::new(
            KafkaEmitter::connect(&self.config.kafka_producer, consumer_config.connect_timeout)
                .await?,
        );

        let mut sources = Vec::with_capacity(Priority::ALL.len());
        for band in Priority::ALL {
            sources.push(KafkaBandSource::connect(consumer_config, band).await?);
        }

        let processor = NotificationProcessor::new(
            AdmissionController::new(self.counter_store.clone(), self.config.admission.clone()),
            ChannelResolver::new(self.preference_store.clone(), self.config.resolver.clone()),
            emitter.clone(),
            self.stats.clone(),
        );

        info!(
            brokers = ?consumer_config.brokers,
            group_id = %consumer_config.group_id,
            delivery_topic = %self.config.kafka_producer.topic,
            "Starting notification pipeline"
        );

        let result = run_pipeline(
            sources,
            processor,
            &self.config.scheduler,
            self.stats.clone(),
            self.cancellation_token.clone(),
            self.config.shutdown_timeout,
        )
        .await;

        if let Err(e) = emitter.flush(PRODUCER_FLUSH_TIMEOUT) {
            warn!(error = %e, "Failed to flush delivery producer");
        }
        self.shutdown().await;
        result
    }

    async fn shutdown(&self) {
        self.cancellation_token.cancel();
        if let Some(pool) = &self.pool {
            info!("Closing database pool...");
            pool.close().await;
        }
        info!("Services shut down");
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn counter_store(&self) -> Arc<dyn CounterStore> {
        self.counter_store.clone()
    }

    pub fn preference_store(&self) -> Arc<dyn PreferenceStore> {
        self.preference_store.clone()
    }
}
