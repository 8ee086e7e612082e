//! Per-band reader task.
//!
//! Pulls raw messages from the band source, decodes them, stamps the band
//! priority and stages them for the scheduler. A message's position is only
//! advanced once it has been staged or discarded as poison.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::source::{RecordSource, SourceMessage};
use super::staging::{Staged, StagingSender};
use crate::Result;
use crate::domain::{NotificationRecord, Priority};
use crate::pipeline::stats::PipelineStats;

/// Pause after a source error before polling again.
const SOURCE_ERROR_PAUSE: Duration = Duration::from_millis(500);

pub struct StreamReader<S: RecordSource> {
    band: Priority,
    source: S,
    buffer: StagingSender,
    stats: Arc<PipelineStats>,
}

enum Step {
    Continue,
    Stop,
}

impl<S: RecordSource> StreamReader<S> {
    pub fn new(source: S, buffer: StagingSender, stats: Arc<PipelineStats>) -> Self {
        Self {
            band: source.band(),
            source,
            buffer,
            stats,
        }
    }

    /// Run until cancelled, the source ends or the buffer is closed.
    ///
    /// `ready` fires once the reader is polling.
    pub async fn run(
        mut self,
        cancel: CancellationToken,
        ready: Option<oneshot::Sender<Priority>>,
    ) -> Result<()> {
        info!(band = %self.band, "Stream reader started");
        if let Some(ready) = ready {
            let _ = ready.send(self.band);
        }

        let result = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                next = self.source.next_message() => next,
            };

            match next {
                Ok(Some(message)) => match self.handle(message, &cancel).await {
                    Ok(Step::Continue) => {}
                    Ok(Step::Stop) => break Ok(()),
                    Err(e) => break Err(e),
                },
                Ok(None) => {
                    info!(band = %self.band, "Source exhausted");
                    break Ok(());
                }
                Err(e) => {
                    warn!(band = %self.band, error = %e, "Failed to read from source");
                    tokio::select! {
                        _ = cancel.cancelled() => break Ok(()),
                        _ = tokio::time::sleep(SOURCE_ERROR_PAUSE) => {}
                    }
                }
            }
        };

        self.source.close().await;
        info!(band = %self.band, "Stream reader stopped");
        result
    }

    async fn handle(&mut self, message: SourceMessage, cancel: &CancellationToken) -> Result<Step> {
        self.stats.record_received();

        let decoded = match &message.payload {
            Some(payload) => NotificationRecord::decode(payload),
            None => Err(crate::Error::validation("empty payload")),
        };

        let record = match decoded {
            Ok(record) => record.with_priority(self.band),
            Err(e) => {
                warn!(
                    band = %self.band,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Discarding undecodable message"
                );
                self.stats.record_poison();
                self.advance(&message);
                return Ok(Step::Continue);
            }
        };

        debug!(
            band = %self.band,
            record_id = %record.id,
            user_id = %record.user_id,
            "Staging record"
        );
        match self.buffer.send(record, cancel).await? {
            Staged::Sent => {
                self.advance(&message);
                Ok(Step::Continue)
            }
            Staged::Cancelled => Ok(Step::Stop),
        }
    }

    fn advance(&mut self, message: &SourceMessage) {
        if let Err(e) = self.source.mark_consumed(message) {
            warn!(
                band = %self.band,
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "Failed to store consumer position"
            );
        }
    }
}
