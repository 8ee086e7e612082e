//! Pipeline counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::info;

use crate::error::FailureClass;

#[derive(Debug, Default)]
pub struct PipelineStats {
    received: AtomicU64,
    poison: AtomicU64,
    admitted: AtomicU64,
    rate_limited: AtomicU64,
    undeliverable: AtomicU64,
    delivered: AtomicU64,
    store_failures: AtomicU64,
    publish_failures: AtomicU64,
    other_failures: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub poison: u64,
    pub admitted: u64,
    pub rate_limited: u64,
    pub undeliverable: u64,
    pub delivered: u64,
    pub store_failures: u64,
    pub publish_failures: u64,
    pub other_failures: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poison(&self) {
        self.poison.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_undeliverable(&self) {
        self.undeliverable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, class: FailureClass) {
        let counter = match class {
            FailureClass::Poison => &self.poison,
            FailureClass::Store => &self.store_failures,
            FailureClass::Publish => &self.publish_failures,
            FailureClass::Other => &self.other_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            poison: self.poison.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            undeliverable: self.undeliverable.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            other_failures: self.other_failures.load(Ordering::Relaxed),
        }
    }

    pub fn log_summary(&self) {
        let s = self.snapshot();
        info!(
            received = s.received,
            poison = s.poison,
            admitted = s.admitted,
            rate_limited = s.rate_limited,
            undeliverable = s.undeliverable,
            delivered = s.delivered,
            store_failures = s.store_failures,
            publish_failures = s.publish_failures,
            other_failures = s.other_failures,
            "Pipeline statistics"
        );
    }
}
