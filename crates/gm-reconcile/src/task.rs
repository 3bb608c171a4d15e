use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::{Reconciler, ReconcilerState};

/// How [`ReconcilerHandle::shutdown`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The loop observed cancellation and returned.
    Stopped,
    /// The loop overran the grace period and was aborted.
    Aborted,
    /// The task had panicked.
    Panicked,
}

/// Owner-side handle of a spawned reconciler.
#[derive(Debug)]
pub struct ReconcilerHandle {
    cancel: CancellationToken,
    state: watch::Receiver<ReconcilerState>,
    join: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Ask the loop to stop. Safe to call any number of times, from anywhere,
    /// before or after the loop has exited.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> ReconcilerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReconcilerState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop, then wait up to `grace` for the loop to return.
    pub async fn shutdown(mut self, grace: Duration) -> ShutdownOutcome {
        self.stop();
        match tokio::time::timeout(grace, &mut self.join).await {
            Ok(Ok(())) => ShutdownOutcome::Stopped,
            Ok(Err(e)) => {
                warn!(error = %e, "reconciler task failed");
                ShutdownOutcome::Panicked
            }
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "reconciler overran shutdown grace; aborting");
                self.join.abort();
                ShutdownOutcome::Aborted
            }
        }
    }
}

impl Reconciler {
    /// Move the reconciler onto its own task.
    ///
    /// The first cycle starts one interval after spawning. `cancel` may be a
    /// child of a process-wide token; cancelling either stops the loop.
    pub fn spawn(self, cancel: CancellationToken) -> ReconcilerHandle {
        let state = self.subscribe();
        let span = info_span!("reconciler", source = self.source.name());
        let join = tokio::spawn(self.run(cancel.clone()).instrument(span));
        ReconcilerHandle {
            cancel,
            state,
            join,
        }
    }

    async fn run(self, cancel: CancellationToken) {
        let interval = self.config.interval;
        info!(interval_ms = interval.as_millis() as u64, "reconciler started");

        let mut delay = interval;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
            let outcome = self.run_cycle(&cancel).await;
            delay = outcome.next_delay(interval);
        }

        self.set_state(ReconcilerState::Stopped);
        info!("reconciler stopped");
    }
}
