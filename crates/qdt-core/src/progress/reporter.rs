//! Background progress reporter.
//!
//! The reporter runs as its own tokio task. It samples a [`ByteCounter`] once
//! per interval until the declared total is counted, then waits for its
//! [`ReporterHandle`] to say how the transfer ended. Only
//! [`ReporterHandle::finish`] can produce a completion event; a counted total
//! is not enough, since the bytes may still fail to reach their destination.
//! Dropping the handle aborts the task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, warn};

use super::event::{ProgressCallback, ProgressEvent};
use super::sample::ProgressSample;
use super::tracker::ByteCounter;
use crate::constants::REPORT_INTERVAL;

/// How a reporter task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterOutcome {
    /// The transfer finished with the declared total and a completion event
    /// was emitted.
    Completed,
    /// The transfer ended short or failed and an abort event was emitted.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopSignal {
    Running,
    Finished,
    Failed,
}

/// Builder for a progress reporter task.
pub struct ProgressReporter {
    callback: Arc<dyn ProgressCallback>,
    interval: Duration,
}

impl ProgressReporter {
    pub fn new(callback: Arc<dyn ProgressCallback>) -> Self {
        Self {
            callback,
            interval: REPORT_INTERVAL,
        }
    }

    /// Override the sampling interval. A zero interval is raised to 1ms.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Spawn the reporter for a transfer of `total` bytes counted by `counter`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self, counter: ByteCounter, total: u64) -> ReporterHandle {
        let (stop_tx, stop_rx) = watch::channel(StopSignal::Running);
        let task = tokio::spawn(run(self.callback, self.interval, counter, total, stop_rx));
        ReporterHandle {
            stop_tx,
            task: Some(task),
        }
    }
}

/// Owner of a running reporter task.
pub struct ReporterHandle {
    stop_tx: watch::Sender<StopSignal>,
    task: Option<JoinHandle<ReporterOutcome>>,
}

impl ReporterHandle {
    /// True once the task has emitted its final event.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Report a transfer whose bytes all reached the destination.
    ///
    /// Emits a completion event when the counter has reached the declared
    /// total, and an abort event otherwise.
    pub async fn finish(self) -> ReporterOutcome {
        self.signal(StopSignal::Finished).await
    }

    /// Report a failed or cancelled transfer. Always emits an abort event.
    pub async fn abort(self) -> ReporterOutcome {
        self.signal(StopSignal::Failed).await
    }

    async fn signal(mut self, signal: StopSignal) -> ReporterOutcome {
        let _ = self.stop_tx.send(signal);
        let Some(task) = self.task.take() else {
            return ReporterOutcome::Stopped;
        };
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Progress reporter task failed");
                ReporterOutcome::Stopped
            }
        }
    }
}

impl Drop for ReporterHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.stop_tx.send(StopSignal::Failed);
        }
    }
}

async fn run(
    callback: Arc<dyn ProgressCallback>,
    period: Duration,
    counter: ByteCounter,
    total: u64,
    mut stop_rx: watch::Receiver<StopSignal>,
) -> ReporterOutcome {
    let started = Instant::now();
    debug!(total, "Progress reporter started");
    callback.on_progress(ProgressEvent::Started { total });

    let mut last = ProgressSample::new(started, counter.get());
    let mut ticker = interval_at(started + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sampling = total > 0;

    let signal = loop {
        tokio::select! {
            biased;
            changed = stop_rx.changed() => {
                // A closed channel means the handle is gone.
                if changed.is_err() {
                    break StopSignal::Failed;
                }
                let signal = *stop_rx.borrow_and_update();
                if signal != StopSignal::Running {
                    break signal;
                }
            }
            _ = ticker.tick(), if sampling => {
                let sample = ProgressSample::new(Instant::now(), counter.get());
                let status = sample.status_since(&last, total);
                last = sample;

                if status.is_complete() {
                    // Everything is counted; the handle decides how it ends.
                    sampling = false;
                    continue;
                }
                callback.on_progress(ProgressEvent::Progress(status));
            }
        }
    };

    let bytes = counter.get();
    debug!(bytes, total, ?signal, "Progress reporter stopped");
    if signal == StopSignal::Finished && bytes >= total {
        callback.on_progress(ProgressEvent::Completed {
            total,
            elapsed: started.elapsed(),
        });
        return ReporterOutcome::Completed;
    }
    callback.on_progress(ProgressEvent::Aborted { bytes, total });
    ReporterOutcome::Stopped
}
