//! Environment variable overlay for [`RouterConfig`].

use std::collections::HashMap;
use std::time::Duration;

use tracing::warn;

use super::RouterConfig;

/// Overlay process environment variables onto `config`.
pub fn apply(config: &mut RouterConfig) {
    apply_with(config, |key| std::env::var(key).ok());
}

/// Overlay variables from an arbitrary lookup. Unparseable values are logged
/// and ignored so the default stays in effect.
pub fn apply_with<F>(config: &mut RouterConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    // Kafka consumer
    let consumer = &mut config.kafka_consumer;
    if let Some(v) = get("KAFKA_CONSUMER_BROKERS") {
        consumer.brokers = parse_list(&v);
    }
    if let Some(v) = get("KAFKA_CONSUMER_GROUP_ID") {
        consumer.group_id = v;
    }
    if let Some(v) = get("KAFKA_CONSUMER_TOPIC_HIGH") {
        consumer.topic_high = v;
    }
    if let Some(v) = get("KAFKA_CONSUMER_TOPIC_MEDIUM") {
        consumer.topic_medium = v;
    }
    if let Some(v) = get("KAFKA_CONSUMER_TOPIC_LOW") {
        consumer.topic_low = v;
    }
    set_duration(&get, "KAFKA_CONSUMER_SESSION_TIMEOUT", &mut consumer.session_timeout);

    // Kafka producer
    let producer = &mut config.kafka_producer;
    if let Some(v) = get("KAFKA_PRODUCER_BROKERS") {
        producer.brokers = parse_list(&v);
    }
    if let Some(v) = get("KAFKA_PRODUCER_TOPIC") {
        producer.topic = v;
    }
    set_parsed(&get, "KAFKA_PRODUCER_RETRY_MAX", &mut producer.retry_max);
    set_parsed(&get, "KAFKA_PRODUCER_REQUIRED_ACKS", &mut producer.required_acks);

    // Counter store
    let store = &mut config.counter_store;
    if let Some(v) = get("REDIS_ADDR") {
        store.addr = v;
    }
    if let Some(v) = lookup("REDIS_PASSWORD") {
        store.password = v;
    }
    set_parsed(&get, "REDIS_DB", &mut store.db);

    // Admission
    let admission = &mut config.admission;
    set_parsed(&get, "REDIS_WINDOW_SECONDS", &mut admission.window_secs);
    set_parsed(&get, "REDIS_LIMIT_HIGH", &mut admission.limit_high);
    set_parsed(&get, "REDIS_LIMIT_MEDIUM", &mut admission.limit_medium);
    set_parsed(&get, "REDIS_LIMIT_LOW", &mut admission.limit_low);
    if let Some(v) = get("RATE_LIMIT_EVENT_CAPS") {
        match parse_caps(&v) {
            Some(caps) => admission.event_type_caps = caps,
            None => warn!(value = %v, "Ignoring malformed RATE_LIMIT_EVENT_CAPS"),
        }
    }

    // Scheduler
    let scheduler = &mut config.scheduler;
    set_parsed(&get, "BUFFER_CAPACITY_HIGH", &mut scheduler.capacity_high);
    set_parsed(&get, "BUFFER_CAPACITY_MEDIUM", &mut scheduler.capacity_medium);
    set_parsed(&get, "BUFFER_CAPACITY_LOW", &mut scheduler.capacity_low);
    if let Some(v) = get("SCHEDULER_PAUSE_MS") {
        match v.trim().parse::<u64>() {
            Ok(ms) => scheduler.decision_pause = Duration::from_millis(ms),
            Err(_) => warn!(value = %v, "Ignoring malformed SCHEDULER_PAUSE_MS"),
        }
    }

    if let Some(v) = get("FAILSAFE_CHANNEL") {
        config.resolver.failsafe_channel = v.trim().to_string();
    }

    if let Some(v) = get("DATABASE_URL") {
        config.database.url = v;
    }
    set_parsed(&get, "DB_MAX_CONNS", &mut config.database.max_connections);

    if let Some(v) = get("LOG_DIR") {
        config.logging.log_dir = Some(v);
    }
    if let Some(v) = get("LOG_FORMAT") {
        config.logging.json = v.trim().eq_ignore_ascii_case("json");
    }

    set_duration(&get, "SHUTDOWN_TIMEOUT", &mut config.shutdown_timeout);

    if let Some(v) = get("MOCK_MODE") {
        config.mock_mode = parse_bool(&v);
    }
}

fn set_parsed<G, T>(get: &G, key: &str, slot: &mut T)
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(v) = get(key) {
        match v.trim().parse::<T>() {
            Ok(parsed) => *slot = parsed,
            Err(_) => warn!(key, value = %v, "Ignoring unparseable environment value"),
        }
    }
}

fn set_duration<G>(get: &G, key: &str, slot: &mut Duration)
where
    G: Fn(&str) -> Option<String>,
{
    if let Some(v) = get(key) {
        match parse_duration(&v) {
            Some(d) => *slot = d,
            None => warn!(key, value = %v, "Ignoring unparseable duration"),
        }
    }
}

/// Accepts a JSON array (`["a:9092","b:9092"]`) or a comma separated list.
pub fn parse_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[')
        && let Ok(items) = serde_json::from_str::<Vec<String>>(trimmed)
    {
        return items;
    }
    trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parses `10s`, `500ms`, `2m`, `1h 30m` or plain seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let s = raw.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).ok()
}

/// Accepts a JSON object (`{"like":20}`) or `like=20,follow=10`.
fn parse_caps(raw: &str) -> Option<HashMap<String, u64>> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed).ok();
    }
    trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (event, cap) = pair.split_once('=')?;
            Some((event.trim().to_string(), cap.trim().parse().ok()?))
        })
        .collect()
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
