//! Recording sink for tests and dry runs.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{DeliveryReceipt, DeliverySink};
use crate::domain::ProcessedNotification;
use crate::{Error, Result};

#[derive(Debug, Default)]
pub struct MemorySink {
    emitted: Mutex<Vec<ProcessedNotification>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitted(&self) -> Vec<ProcessedNotification> {
        self.emitted.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.emitted.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitted.lock().is_empty()
    }

    /// Make every emit fail, as if the broker rejected the publish.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }
}

#[async_trait]
impl DeliverySink for MemorySink {
    async fn emit(&self, notification: &ProcessedNotification) -> Result<DeliveryReceipt> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(Error::Kafka(rdkafka::error::KafkaError::MessageProduction(
                rdkafka::types::RDKafkaErrorCode::BrokerNotAvailable,
            )));
        }
        // Serialize like the real emitter so encoding errors surface here too.
        notification.to_json()?;
        let mut emitted = self.emitted.lock();
        emitted.push(notification.clone());
        Ok(DeliveryReceipt {
            partition: 0,
            offset: emitted.len() as i64 - 1,
        })
    }
}
