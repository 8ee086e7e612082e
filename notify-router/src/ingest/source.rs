//! Band record sources.

use async_trait::async_trait;

use crate::Result;
use crate::domain::Priority;

/// One raw message pulled from a band topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// `None` for tombstones.
    pub payload: Option<Vec<u8>>,
}

/// A pull-based stream of raw band messages with explicit position tracking.
#[async_trait]
pub trait RecordSource: Send {
    fn band(&self) -> Priority;

    /// Next message. `Ok(None)` means the source is exhausted.
    async fn next_message(&mut self) -> Result<Option<SourceMessage>>;

    /// Advance the group position past `message`.
    fn mark_consumed(&mut self, message: &SourceMessage) -> Result<()>;

    /// Flush positions and leave the consumer group.
    async fn close(&mut self);
}
