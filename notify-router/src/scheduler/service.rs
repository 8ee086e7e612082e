//! Priority scheduler.
//!
//! Drains the three staging buffers into a single serialized sequence of
//! handler invocations. Each band keeps at most one record in a head slot;
//! the arbiter picks among filled heads. Before the chosen record is handed
//! over, higher bands that were empty at decision time are re-checked once
//! and a record that arrived in the meantime is processed first.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::deadline::DeadlineArbiter;
use crate::Result;
use crate::domain::{NotificationRecord, Priority};
use crate::ingest::StagingReceiver;
use crate::pipeline::stats::PipelineStats;

/// Per-record work invoked by the scheduler.
#[async_trait]
pub trait RecordHandler: Send + Sync {
    /// Process one record to completion. Errors are logged by the scheduler,
    /// which then moves on to the next record.
    async fn handle(&self, record: NotificationRecord) -> Result<()>;
}

/// A band choice together with the head state it was made on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Decision {
    band: Priority,
    ready: [bool; 3],
}

enum Wake {
    Cancelled,
    Received(Priority, Option<NotificationRecord>),
}

async fn recv_band(rx: Option<&mut StagingReceiver>) -> Option<NotificationRecord> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

pub struct PriorityScheduler<H: RecordHandler> {
    /// Indexed by band; `None` once the band's reader is gone and drained.
    receivers: [Option<StagingReceiver>; 3],
    heads: [Option<NotificationRecord>; 3],
    arbiter: DeadlineArbiter,
    handler: H,
    decision_pause: Duration,
    stats: Arc<PipelineStats>,
}

impl<H: RecordHandler> PriorityScheduler<H> {
    pub fn new(
        receivers: impl IntoIterator<Item = StagingReceiver>,
        arbiter: DeadlineArbiter,
        handler: H,
        decision_pause: Duration,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let mut slots: [Option<StagingReceiver>; 3] = [None, None, None];
        for rx in receivers {
            let i = rx.band().index();
            slots[i] = Some(rx);
        }
        Self {
            receivers: slots,
            heads: [None, None, None],
            arbiter,
            handler,
            decision_pause,
            stats,
        }
    }

    /// Run until cancelled or until every buffer is closed and drained.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(pause_ms = self.decision_pause.as_millis() as u64, "Scheduler started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let Some((band, record)) = self.next_ready() else {
                if self.receivers.iter().all(Option::is_none) {
                    info!("All staging buffers closed and drained");
                    break;
                }
                match self.wait_any(&cancel).await {
                    Wake::Cancelled => break,
                    Wake::Received(band, Some(record)) => self.heads[band.index()] = Some(record),
                    Wake::Received(band, None) => {
                        debug!(band = %band, "Staging buffer closed");
                        self.receivers[band.index()] = None;
                    }
                }
                continue;
            };

            let record_id = record.id.clone();
            let user_id = record.user_id.clone();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(record_id = %record_id, band = %band, "Cancelled while processing record");
                    break;
                }
                result = self.handler.handle(record) => result,
            };
            if let Err(e) = result {
                self.stats.record_failure(e.failure_class());
                if e.is_transient() {
                    warn!(
                        record_id = %record_id,
                        user_id = %user_id,
                        band = %band,
                        error = %e,
                        "Failed to process record, dropping it"
                    );
                } else {
                    error!(
                        record_id = %record_id,
                        user_id = %user_id,
                        band = %band,
                        error = %e,
                        "Unexpected error processing record, dropping it"
                    );
                }
            }

            if !self.decision_pause.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.decision_pause) => {}
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// Take the next record to process, if any head is filled.
    fn next_ready(&mut self) -> Option<(Priority, NotificationRecord)> {
        self.refill();
        let decision = self.decide()?;
        let band = self.commit(decision);
        let record = self.heads[band.index()].take()?;
        self.arbiter.served(band);
        Some((band, record))
    }

    /// Pull a record into every empty head without waiting.
    fn refill(&mut self) {
        for i in 0..3 {
            if self.heads[i].is_some() {
                continue;
            }
            if let Some(rx) = self.receivers[i].as_mut() {
                match rx.try_recv() {
                    Ok(record) => self.heads[i] = Some(record),
                    Err(TryRecvError::Empty) => {}
                    Err(TryRecvError::Disconnected) => self.receivers[i] = None,
                }
            }
        }
    }

    fn decide(&mut self) -> Option<Decision> {
        let ready = self.heads.each_ref().map(Option::is_some);
        self.arbiter
            .select(ready)
            .map(|band| Decision { band, ready })
    }

    /// Re-check higher bands that were empty when `decision` was made.
    ///
    /// A record found there is judged by the arbiter together with the
    /// chosen band, the same way [`Self::decide`] would have judged it.
    /// Returns the band whose head should be processed now.
    fn commit(&mut self, decision: Decision) -> Priority {
        for &higher in decision.band.higher_bands() {
            let i = higher.index();
            if decision.ready[i] || self.heads[i].is_some() {
                continue;
            }
            if let Some(rx) = self.receivers[i].as_mut()
                && let Ok(record) = rx.try_recv()
            {
                debug!(
                    chosen = %decision.band,
                    arrived = %higher,
                    record_id = %record.id,
                    "Higher band record arrived before commit"
                );
                self.heads[i] = Some(record);
                let ready = self.heads.each_ref().map(Option::is_some);
                return self.arbiter.select(ready).unwrap_or(decision.band);
            }
        }
        decision.band
    }

    async fn wait_any(&mut self, cancel: &CancellationToken) -> Wake {
        let [high, medium, low] = &mut self.receivers;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Wake::Cancelled,
            r = recv_band(high.as_mut()) => Wake::Received(Priority::High, r),
            r = recv_band(medium.as_mut()) => Wake::Received(Priority::Medium, r),
            r = recv_band(low.as_mut()) => Wake::Received(Priority::Low, r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::ingest::staging::{StagingSender, staging_buffer};
    use parking_lot::Mutex;

    #[derive(Default, Clone)]
    struct Recorder {
        seen: Arc<Mutex<Vec<String>>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl RecordHandler for Recorder {
        async fn handle(&self, record: NotificationRecord) -> Result<()> {
            self.seen.lock().push(record.id.clone());
            if self.fail_on.as_deref() == Some(record.id.as_str()) {
                return Err(Error::counter_store("unreachable"));
            }
            Ok(())
        }
    }

    struct Bands {
        senders: [StagingSender; 3],
        scheduler: PriorityScheduler<Recorder>,
        recorder: Recorder,
        stats: Arc<PipelineStats>,
    }

    fn bands(capacity: usize, recorder: Recorder) -> Bands {
        let (h_tx, h_rx) = staging_buffer(Priority::High, capacity);
        let (m_tx, m_rx) = staging_buffer(Priority::Medium, capacity);
        let (l_tx, l_rx) = staging_buffer(Priority::Low, capacity);
        let stats = Arc::new(PipelineStats::new());
        let scheduler = PriorityScheduler::new(
            [h_rx, m_rx, l_rx],
            DeadlineArbiter::default(),
            recorder.clone(),
            Duration::ZERO,
            stats.clone(),
        );
        Bands {
            senders: [h_tx, m_tx, l_tx],
            scheduler,
            recorder,
            stats,
        }
    }

    async fn stage(senders: &[StagingSender; 3], band: Priority, id: &str) {
        let record = NotificationRecord::new(id, "u1", "event", band);
        senders[band.index()]
            .send(record, &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_high_before_low_and_drains() {
        let Bands {
            senders,
            scheduler,
            recorder,
            ..
        } = bands(8, Recorder::default());
        stage(&senders, Priority::Low, "l1").await;
        stage(&senders, Priority::High, "h1").await;
        stage(&senders, Priority::Medium, "m1").await;
        drop(senders);

        scheduler.run(CancellationToken::new()).await;

        assert_eq!(*recorder.seen.lock(), vec!["h1", "m1", "l1"]);
    }

    #[tokio::test]
    async fn test_newly_arrived_high_preempts_commit() {
        let Bands {
            senders,
            mut scheduler,
            ..
        } = bands(8, Recorder::default());
        stage(&senders, Priority::Low, "l1").await;

        scheduler.refill();
        let decision = scheduler.decide().unwrap();
        assert_eq!(decision.band, Priority::Low);

        stage(&senders, Priority::High, "h1").await;
        stage(&senders, Priority::Medium, "m1").await;

        // High is checked first and only one preempting record is taken.
        assert_eq!(scheduler.commit(decision), Priority::High);
        assert_eq!(scheduler.heads[Priority::High.index()].as_ref().unwrap().id, "h1");
        assert!(scheduler.heads[Priority::Medium.index()].is_none());
        assert_eq!(scheduler.heads[Priority::Low.index()].as_ref().unwrap().id, "l1");
    }

    #[tokio::test]
    async fn test_waiting_high_goes_before_waiting_low() {
        let Bands {
            senders,
            mut scheduler,
            ..
        } = bands(16, Recorder::default());
        for i in 0..8 {
            stage(&senders, Priority::Medium, &format!("m{}", i)).await;
        }
        stage(&senders, Priority::Low, "l1").await;

        let mut order = Vec::new();
        for _ in 0..4 {
            order.push(scheduler.next_ready().unwrap().1.id);
        }
        stage(&senders, Priority::High, "h1").await;
        for _ in 0..3 {
            order.push(scheduler.next_ready().unwrap().1.id);
        }

        assert_eq!(order, vec!["m0", "m1", "m2", "m3", "h1", "l1", "m4"]);
    }

    #[tokio::test]
    async fn test_ready_higher_band_does_not_preempt() {
        let Bands {
            senders,
            mut scheduler,
            ..
        } = bands(8, Recorder::default());
        stage(&senders, Priority::High, "h1").await;
        stage(&senders, Priority::Low, "l1").await;
        scheduler.refill();

        // Decision made with high already ready: commit keeps the choice.
        let decision = Decision {
            band: Priority::Low,
            ready: [true, false, true],
        };
        stage(&senders, Priority::High, "h2").await;
        assert_eq!(scheduler.commit(decision), Priority::Low);
    }

    #[tokio::test]
    async fn test_low_band_served_under_sustained_high_load() {
        let Bands {
            senders,
            scheduler,
            recorder,
            ..
        } = bands(64, Recorder::default());
        for i in 0..60 {
            stage(&senders, Priority::High, &format!("h{}", i)).await;
        }
        for i in 0..3 {
            stage(&senders, Priority::Low, &format!("l{}", i)).await;
        }
        drop(senders);

        scheduler.run(CancellationToken::new()).await;

        let seen = recorder.seen.lock().clone();
        assert_eq!(seen.len(), 63);
        let first_low = seen.iter().position(|id| id.starts_with('l')).unwrap();
        assert!(first_low < 30, "first low record at {}", first_low);
    }

    #[tokio::test]
    async fn test_handler_error_does_not_stop_scheduler() {
        let recorder = Recorder {
            fail_on: Some("h1".into()),
            ..Default::default()
        };
        let Bands {
            senders,
            scheduler,
            recorder,
            stats,
        } = bands(8, recorder);
        stage(&senders, Priority::High, "h1").await;
        stage(&senders, Priority::High, "h2").await;
        drop(senders);

        scheduler.run(CancellationToken::new()).await;

        assert_eq!(*recorder.seen.lock(), vec!["h1", "h2"]);
        assert_eq!(stats.snapshot().store_failures, 1);
    }

    #[tokio::test]
    async fn test_cancel_while_idle() {
        let Bands {
            senders, scheduler, ..
        } = bands(8, Recorder::default());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(scheduler.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("scheduler should stop on cancel")
            .unwrap();
        drop(senders);
    }

    #[tokio::test]
    async fn test_wakes_on_late_record() {
        let Bands {
            senders,
            scheduler,
            recorder,
            ..
        } = bands(8, Recorder::default());
        let task = tokio::spawn(scheduler.run(CancellationToken::new()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        stage(&senders, Priority::Medium, "m1").await;
        drop(senders);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*recorder.seen.lock(), vec!["m1"]);
    }
}
