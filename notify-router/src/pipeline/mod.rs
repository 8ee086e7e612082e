//! Pipeline wiring: band readers, staging buffers and the scheduler.

pub mod processor;
pub mod stats;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::ingest::{RecordSource, StreamReader, staging_buffer};
use crate::scheduler::{DeadlineArbiter, PriorityScheduler, RecordHandler};
use crate::{Error, Result};

pub use processor::{NotificationProcessor, ProcessOutcome};
pub use stats::{PipelineStats, StatsSnapshot};

/// Run readers and scheduler until `cancel` fires or every source is
/// exhausted and its buffer drained.
///
/// The scheduler only starts once every reader reported ready. After
/// cancellation the tasks get `shutdown_timeout` to finish before they are
/// aborted.
pub async fn run_pipeline<S, H>(
    sources: Vec<S>,
    handler: H,
    config: &SchedulerConfig,
    stats: Arc<PipelineStats>,
    cancel: CancellationToken,
    shutdown_timeout: Duration,
) -> Result<()>
where
    S: RecordSource + 'static,
    H: RecordHandler + 'static,
{
    let cancel = cancel.child_token();
    let mut readers = JoinSet::new();
    let mut receivers = Vec::with_capacity(sources.len());
    let mut ready = Vec::with_capacity(sources.len());

    for source in sources {
        let band = source.band();
        let (tx, rx) = staging_buffer(band, config.capacity_for(band));
        let (ready_tx, ready_rx) = oneshot::channel();
        let reader = StreamReader::new(source, tx, stats.clone());
        readers.spawn(reader.run(cancel.clone(), Some(ready_tx)));
        receivers.push(rx);
        ready.push(ready_rx);
    }

    for ready_rx in ready {
        tokio::select! {
            _ = cancel.cancelled() => {
                readers.shutdown().await;
                return Ok(());
            }
            band = ready_rx => match band {
                Ok(band) => info!(band = %band, "Stream reader ready"),
                Err(_) => {
                    cancel.cancel();
                    readers.shutdown().await;
                    return Err(Error::Other("stream reader exited before becoming ready".into()));
                }
            },
        }
    }
    info!(readers = readers.len(), "All stream readers ready, starting scheduler");

    let scheduler = PriorityScheduler::new(
        receivers,
        DeadlineArbiter::new(config.periods()),
        handler,
        config.decision_pause,
        stats.clone(),
    );
    let mut scheduler_task = tokio::spawn(scheduler.run(cancel.clone()));
    spawn_stats_reporter(stats.clone(), config.stats_interval, cancel.clone());

    let mut scheduler_done = false;
    tokio::select! {
        _ = cancel.cancelled() => info!("Shutdown requested"),
        joined = &mut scheduler_task => {
            scheduler_done = true;
            if let Err(e) = joined {
                error!(error = %e, "Scheduler task failed");
            }
        }
    }
    cancel.cancel();

    let drain = async {
        if !scheduler_done && let Err(e) = (&mut scheduler_task).await {
            error!(error = %e, "Scheduler task failed");
        }
        while let Some(joined) = readers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Stream reader stopped with error"),
                Err(e) => error!(error = %e, "Stream reader task failed"),
            }
        }
    };
    if tokio::time::timeout(shutdown_timeout, drain).await.is_err() {
        warn!(
            timeout_secs = shutdown_timeout.as_secs(),
            "Pipeline did not stop in time, aborting remaining tasks"
        );
        scheduler_task.abort();
        readers.abort_all();
    }

    stats.log_summary();
    Ok(())
}

fn spawn_stats_reporter(stats: Arc<PipelineStats>, every: Duration, cancel: CancellationToken) {
    if every.is_zero() {
        return;
    }
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => stats.log_summary(),
            }
        }
    });
}
