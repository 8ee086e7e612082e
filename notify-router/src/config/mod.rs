//! Service configuration.
//!
//! Every setting has a default matching the reference deployment and can be
//! overridden from the environment (a `.env` file is loaded first by `main`).

pub mod env;

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{Priority, channel};
use crate::{Error, Result};

/// Inbound band consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConsumerConfig {
    pub brokers: Vec<String>,
    /// Base consumer group id. Each band appends `-high`, `-medium` or `-low`.
    pub group_id: String,
    pub topic_high: String,
    pub topic_medium: String,
    pub topic_low: String,
    pub session_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// How long startup waits for broker metadata before giving up.
    pub connect_timeout: Duration,
}

impl KafkaConsumerConfig {
    pub fn topic_for(&self, band: Priority) -> &str {
        match band {
            Priority::High => &self.topic_high,
            Priority::Medium => &self.topic_medium,
            Priority::Low => &self.topic_low,
        }
    }

    /// Consumer group identity for one band.
    pub fn group_for(&self, band: Priority) -> String {
        format!("{}-{}", self.group_id, band.as_str())
    }
}

impl Default for KafkaConsumerConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            group_id: "rate-limiter-group".to_string(),
            topic_high: "notifications.priority.high".to_string(),
            topic_medium: "notifications.priority.medium".to_string(),
            topic_low: "notifications.priority.low".to_string(),
            session_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Delivery topic producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaProducerConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    /// Client-side retry budget. The pipeline itself never retries.
    pub retry_max: u32,
    /// `0` = no ack, `1` = leader, `-1` = all in-sync replicas.
    pub required_acks: i16,
    /// Upper bound on a single publish including queueing.
    pub message_timeout: Duration,
}

impl KafkaProducerConfig {
    /// Value for librdkafka's `acks` property.
    pub fn acks(&self) -> &'static str {
        match self.required_acks {
            0 => "0",
            1 => "1",
            _ => "all",
        }
    }
}

impl Default for KafkaProducerConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            topic: "notifications.delivery".to_string(),
            retry_max: 3,
            required_acks: 1,
            message_timeout: Duration::from_secs(5),
        }
    }
}

/// Connection to the shared counter store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterStoreConfig {
    pub addr: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub db: i64,
}

/// Port used when `addr` does not name one.
const DEFAULT_REDIS_PORT: u16 = 6379;

impl CounterStoreConfig {
    /// Connection parameters for the Redis client. The password is passed
    /// as-is, so it may contain any character.
    pub fn connection_info(&self) -> Result<redis::ConnectionInfo> {
        let addr = self.addr.trim();
        let (host, port) = match addr.rsplit_once(':') {
            Some((host, port)) if !host.ends_with(':') => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| Error::config(format!("invalid counter store address: {}", addr)))?;
                (host, port)
            }
            _ => (addr, DEFAULT_REDIS_PORT),
        };
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(Error::config("counter store address has no host"));
        }

        Ok(redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(host.to_string(), port),
            redis: redis::RedisConnectionInfo {
                db: self.db,
                password: (!self.password.is_empty()).then(|| self.password.clone()),
                ..Default::default()
            },
        })
    }
}

impl Default for CounterStoreConfig {
    fn default() -> Self {
        Self {
            addr: "localhost:6379".to_string(),
            password: String::new(),
            db: 0,
        }
    }
}

/// Sliding-window admission limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    pub window_secs: u64,
    pub limit_high: u64,
    pub limit_medium: u64,
    pub limit_low: u64,
    /// Priority-independent ceilings per (user, event type).
    pub event_type_caps: HashMap<String, u64>,
}

impl AdmissionConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn limit_for(&self, band: Priority) -> u64 {
        match band {
            Priority::High => self.limit_high,
            Priority::Medium => self.limit_medium,
            Priority::Low => self.limit_low,
        }
    }

    pub fn cap_for(&self, event_type: &str) -> Option<u64> {
        self.event_type_caps.get(event_type).copied()
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            window_secs: 3600,
            limit_high: 100,
            limit_medium: 50,
            limit_low: 20,
            event_type_caps: HashMap::from([("like".to_string(), 20)]),
        }
    }
}

/// Staging buffers and band arbitration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub capacity_high: usize,
    pub capacity_medium: usize,
    pub capacity_low: usize,
    /// Pause between two scheduling decisions.
    pub decision_pause: Duration,
    /// Virtual-deadline period per band. Smaller means served more often.
    pub period_high: u64,
    pub period_medium: u64,
    pub period_low: u64,
    /// Interval between statistics log lines.
    pub stats_interval: Duration,
}

impl SchedulerConfig {
    pub fn capacity_for(&self, band: Priority) -> usize {
        match band {
            Priority::High => self.capacity_high,
            Priority::Medium => self.capacity_medium,
            Priority::Low => self.capacity_low,
        }
    }

    pub fn periods(&self) -> [u64; 3] {
        [self.period_high, self.period_medium, self.period_low]
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            capacity_high: 1000,
            capacity_medium: 500,
            capacity_low: 100,
            decision_pause: Duration::from_millis(5),
            period_high: 1,
            period_medium: 4,
            period_low: 16,
            stats_interval: Duration::from_secs(60),
        }
    }
}

/// Channel resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Channel forced for high-priority records with nothing else enabled.
    pub failsafe_channel: String,
    /// Channel map for users without stored preferences.
    pub default_channels: std::collections::BTreeMap<String, bool>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            failsafe_channel: channel::DEFAULT_FAILSAFE.to_string(),
            default_channels: channel::default_channel_map(),
        }
    }
}

/// Preference store database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:preferences.db?mode=rwc".to_string(),
            max_connections: 10,
        }
    }
}

/// Log output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Directory for daily-rolled log files. Console only when unset.
    pub log_dir: Option<String>,
    /// Emit JSON lines on the console instead of text.
    pub json: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub kafka_consumer: KafkaConsumerConfig,
    pub kafka_producer: KafkaProducerConfig,
    pub counter_store: CounterStoreConfig,
    pub admission: AdmissionConfig,
    pub scheduler: SchedulerConfig,
    pub resolver: ResolverConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingSettings,
    pub shutdown_timeout: Duration,
    /// Use in-memory counter and preference stores instead of Redis and SQL.
    pub mock_mode: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            kafka_consumer: KafkaConsumerConfig::default(),
            kafka_producer: KafkaProducerConfig::default(),
            counter_store: CounterStoreConfig::default(),
            admission: AdmissionConfig::default(),
            scheduler: SchedulerConfig::default(),
            resolver: ResolverConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingSettings::default(),
            shutdown_timeout: Duration::from_secs(10),
            mock_mode: false,
        }
    }
}

impl RouterConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();
        env::apply(&mut config);
        config
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        for band in Priority::ALL {
            if self.scheduler.capacity_for(band) == 0 {
                return Err(Error::config(format!(
                    "buffer capacity for {} band must be positive",
                    band
                )));
            }
            if self.admission.limit_for(band) == 0 {
                return Err(Error::config(format!(
                    "admission limit for {} band must be positive",
                    band
                )));
            }
        }
        if self.scheduler.periods().contains(&0) {
            return Err(Error::config("band periods must be positive"));
        }
        if self.admission.window_secs == 0 {
            return Err(Error::config("rate limit window must be positive"));
        }
        if self.kafka_consumer.brokers.is_empty() || self.kafka_producer.brokers.is_empty() {
            return Err(Error::config("at least one broker is required"));
        }
        if self.resolver.failsafe_channel.trim().is_empty() {
            return Err(Error::config("failsafe channel must not be empty"));
        }

        let a = &self.admission;
        if a.limit_high < a.limit_medium || a.limit_medium < a.limit_low {
            warn!(
                high = a.limit_high,
                medium = a.limit_medium,
                low = a.limit_low,
                "Admission limits are not ordered high >= medium >= low"
            );
        }
        let s = &self.scheduler;
        if s.capacity_high < s.capacity_medium || s.capacity_medium < s.capacity_low {
            warn!(
                high = s.capacity_high,
                medium = s.capacity_medium,
                low = s.capacity_low,
                "Buffer capacities are not decreasing with priority"
            );
        }

        Ok(())
    }
}
