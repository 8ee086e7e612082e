//! Delivery topic publishing.

pub mod kafka;
pub mod memory;

use async_trait::async_trait;

use crate::Result;
use crate::domain::ProcessedNotification;

pub use kafka::KafkaEmitter;
pub use memory::MemorySink;

/// Where the broker stored a published notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub partition: i32,
    pub offset: i64,
}

/// Publishes processed notifications for the delivery workers.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Resolves once the broker acknowledged the record at the configured level.
    async fn emit(&self, notification: &ProcessedNotification) -> Result<DeliveryReceipt>;
}
