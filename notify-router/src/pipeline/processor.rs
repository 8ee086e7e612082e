//! Per-record processing: admit, resolve, emit.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info};

use super::stats::PipelineStats;
use crate::Result;
use crate::admission::AdmissionController;
use crate::delivery::{DeliveryReceipt, DeliverySink};
use crate::domain::{NotificationRecord, ProcessedNotification};
use crate::routing::ChannelResolver;
use crate::scheduler::RecordHandler;

/// Terminal state of a record that was processed without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    RateLimited,
    /// Admitted, but no channel applies.
    NotDelivered,
    Delivered {
        channels: BTreeSet<String>,
        receipt: DeliveryReceipt,
    },
}

pub struct NotificationProcessor {
    admission: AdmissionController,
    resolver: ChannelResolver,
    sink: Arc<dyn DeliverySink>,
    stats: Arc<PipelineStats>,
}

impl NotificationProcessor {
    pub fn new(
        admission: AdmissionController,
        resolver: ChannelResolver,
        sink: Arc<dyn DeliverySink>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            admission,
            resolver,
            sink,
            stats,
        }
    }

    pub async fn process(&self, record: &NotificationRecord) -> Result<ProcessOutcome> {
        let started = Instant::now();

        if !self.admission.admit(record).await? {
            self.stats.record_rate_limited();
            info!(
                record_id = %record.id,
                user_id = %record.user_id,
                event_type = %record.event_type,
                band = %record.priority,
                "Notification rate limited"
            );
            return Ok(ProcessOutcome::RateLimited);
        }
        self.stats.record_admitted();

        let channels = self.resolver.resolve(record).await?;
        if channels.is_empty() {
            self.stats.record_undeliverable();
            debug!(
                record_id = %record.id,
                user_id = %record.user_id,
                "No delivery channel applies"
            );
            return Ok(ProcessOutcome::NotDelivered);
        }

        let processed = ProcessedNotification::new(record.clone(), channels.iter().cloned());
        let receipt = self.sink.emit(&processed).await?;
        self.stats.record_delivered();

        info!(
            record_id = %record.id,
            user_id = %record.user_id,
            event_type = %record.event_type,
            band = %record.priority,
            channels = ?processed.channels,
            partition = receipt.partition,
            offset = receipt.offset,
            latency_ms = started.elapsed().as_millis() as u64,
            "Notification routed"
        );

        Ok(ProcessOutcome::Delivered { channels, receipt })
    }
}

#[async_trait]
impl RecordHandler for NotificationProcessor {
    async fn handle(&self, record: NotificationRecord) -> Result<()> {
        self.process(&record).await.map(|_| ())
    }
}
