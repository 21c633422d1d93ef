use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info};

use crate::config::MAX_PERIOD_SECS;

use super::{OverdueProcessor, RunOutcome};

const MIN_PERIOD: Duration = Duration::from_millis(1);
const MAX_PERIOD: Duration = Duration::from_secs(MAX_PERIOD_SECS);

/// Drives `OverdueProcessor::run_once` on a fixed interval until stopped.
pub struct OverdueScheduler {
    processor: Arc<OverdueProcessor>,
    interval: Duration,
    run_on_start: bool,
}

impl OverdueScheduler {
    pub fn new(processor: Arc<OverdueProcessor>, interval: Duration, run_on_start: bool) -> Self {
        Self {
            processor,
            interval,
            run_on_start,
        }
    }

    /// Start the loop on the current tokio runtime.
    pub fn spawn(self) -> SchedulerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));
        SchedulerHandle { stop_tx, task }
    }

    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        // tokio panics on a zero period and on deadlines past `Instant`'s range
        let period = self.interval.clamp(MIN_PERIOD, MAX_PERIOD);
        let now = Instant::now();
        let start = if self.run_on_start {
            now
        } else {
            now.checked_add(period).unwrap_or(now)
        };
        let mut ticker = interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_secs = period.as_secs(), "overdue scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.processor.run_once(Utc::now()).await {
                        Ok(RunOutcome::Completed(report)) => {
                            debug!(run_id = %report.run_id, paid = report.paid, "scheduled run completed");
                        }
                        Ok(RunOutcome::Skipped) => debug!("scheduled run skipped"),
                        Err(err) => error!(error = %err, "scheduled overdue run failed"),
                    }
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("overdue scheduler stopped");
    }
}

/// Handle to a running scheduler. Dropping it also ends the loop, without
/// waiting for it.
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the loop to exit and wait for it. A run in progress finishes first.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(err) = self.task.await {
            error!(error = %err, "overdue scheduler task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
