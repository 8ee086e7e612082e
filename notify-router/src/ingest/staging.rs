//! Bounded per-band staging buffers.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;

use crate::domain::{NotificationRecord, Priority};
use crate::{Error, Result};

/// Outcome of a blocking send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staged {
    Sent,
    /// Cancellation fired while waiting for space. The record was dropped.
    Cancelled,
}

/// Create the buffer for one band. `capacity` must be positive.
pub fn staging_buffer(band: Priority, capacity: usize) -> (StagingSender, StagingReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (StagingSender { band, tx }, StagingReceiver { band, rx })
}

/// Write half, owned by the band's reader.
#[derive(Debug, Clone)]
pub struct StagingSender {
    band: Priority,
    tx: mpsc::Sender<NotificationRecord>,
}

impl StagingSender {
    pub fn band(&self) -> Priority {
        self.band
    }

    /// Enqueue, waiting while the buffer is full.
    pub async fn send(
        &self,
        record: NotificationRecord,
        cancel: &CancellationToken,
    ) -> Result<Staged> {
        debug_assert_eq!(record.priority, self.band);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(Staged::Cancelled),
            sent = self.tx.send(record) => match sent {
                Ok(()) => Ok(Staged::Sent),
                Err(_) => Err(Error::BufferClosed(self.band)),
            },
        }
    }
}

/// Read half, owned by the scheduler.
#[derive(Debug)]
pub struct StagingReceiver {
    band: Priority,
    rx: mpsc::Receiver<NotificationRecord>,
}

impl StagingReceiver {
    pub fn band(&self) -> Priority {
        self.band
    }

    /// Wait for the next record. `None` once the reader is gone and the
    /// buffer is drained.
    pub async fn recv(&mut self) -> Option<NotificationRecord> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> std::result::Result<NotificationRecord, TryRecvError> {
        self.rx.try_recv()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
