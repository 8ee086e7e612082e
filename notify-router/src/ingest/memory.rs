//! Channel-fed source for mock mode and tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::source::{RecordSource, SourceMessage};
use crate::Result;
use crate::domain::Priority;

/// Feeds payloads into a [`MemorySource`] and observes its positions.
#[derive(Debug, Clone)]
pub struct MemorySourceHandle {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>>,
    consumed: Arc<Mutex<Vec<i64>>>,
    closed: Arc<Mutex<bool>>,
}

impl MemorySourceHandle {
    /// Returns `false` once the source is gone or finished.
    pub fn push(&self, payload: impl Into<Vec<u8>>) -> bool {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(payload.into()).is_ok(),
            None => false,
        }
    }

    /// End the stream for every clone of this handle. Queued payloads are
    /// still delivered.
    pub fn finish(&self) {
        self.tx.lock().take();
    }

    pub fn push_json(&self, value: &serde_json::Value) -> bool {
        self.push(value.to_string())
    }

    /// Offsets marked consumed so far, in order.
    pub fn consumed(&self) -> Vec<i64> {
        self.consumed.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

pub struct MemorySource {
    band: Priority,
    topic: String,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    next_offset: i64,
    consumed: Arc<Mutex<Vec<i64>>>,
    closed: Arc<Mutex<bool>>,
}

impl MemorySource {
    /// The source ends once [`MemorySourceHandle::finish`] is called or every
    /// handle is dropped, and the queue is drained.
    pub fn new(band: Priority) -> (Self, MemorySourceHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let consumed = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(Mutex::new(false));
        let source = Self {
            band,
            topic: format!("memory.{}", band),
            rx,
            next_offset: 0,
            consumed: consumed.clone(),
            closed: closed.clone(),
        };
        (
            source,
            MemorySourceHandle {
                tx: Arc::new(Mutex::new(Some(tx))),
                consumed,
                closed,
            },
        )
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    fn band(&self) -> Priority {
        self.band
    }

    async fn next_message(&mut self) -> Result<Option<SourceMessage>> {
        let Some(payload) = self.rx.recv().await else {
            return Ok(None);
        };
        let offset = self.next_offset;
        self.next_offset += 1;
        Ok(Some(SourceMessage {
            topic: self.topic.clone(),
            partition: 0,
            offset,
            payload: Some(payload),
        }))
    }

    fn mark_consumed(&mut self, message: &SourceMessage) -> Result<()> {
        self.consumed.lock().push(message.offset);
        Ok(())
    }

    async fn close(&mut self) {
        self.rx.close();
        *self.closed.lock() = true;
    }
}
