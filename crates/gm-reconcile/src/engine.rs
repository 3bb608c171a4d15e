use std::sync::Arc;
use std::time::Duration;

use gm_core::{AccrualSource, Order, OrderRepository, Status, Update};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(6);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Pause between cycles when the source has not asked for a back-off.
    pub interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
        }
    }
}

/// Where the reconciler is in its loop.
///
/// `Idle → Polling → Applying → Idle`, and `Idle → Stopped` once cancelled.
/// A cycle with nothing to write goes straight from `Polling` back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    Idle,
    Polling,
    Applying,
    Stopped,
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No pending orders.
    Idle,
    /// Every pending order was polled; `updated` of them were written back,
    /// `skipped` were refused by the state machine.
    Applied {
        polled: usize,
        updated: usize,
        skipped: usize,
    },
    /// The source asked to back off; nothing was written.
    Backoff { after: Duration, polled: usize },
    /// Storage or a non-retryable source error; nothing was written.
    Failed { polled: usize, reason: String },
}

impl CycleOutcome {
    /// Delay before the next cycle starts. A zero back-off hint falls back
    /// to `interval`.
    pub fn next_delay(&self, interval: Duration) -> Duration {
        match self {
            CycleOutcome::Backoff { after, .. } if !after.is_zero() => *after,
            _ => interval,
        }
    }
}

/// Polls the accrual source for pending orders and persists status changes.
pub struct Reconciler {
    pub(crate) repo: Arc<dyn OrderRepository>,
    pub(crate) source: Arc<dyn AccrualSource>,
    pub(crate) config: ReconcilerConfig,
    pub(crate) state: watch::Sender<ReconcilerState>,
}

impl Reconciler {
    pub fn new(
        repo: Arc<dyn OrderRepository>,
        source: Arc<dyn AccrualSource>,
        config: ReconcilerConfig,
    ) -> Self {
        let (state, _) = watch::channel(ReconcilerState::Idle);
        Self {
            repo,
            source,
            config,
            state,
        }
    }

    pub fn config(&self) -> ReconcilerConfig {
        self.config
    }

    pub fn state(&self) -> ReconcilerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReconcilerState> {
        self.state.subscribe()
    }

    pub(crate) fn set_state(&self, next: ReconcilerState) {
        self.state.send_replace(next);
    }

    /// Run one polling cycle.
    ///
    /// `cancel` is checked between source calls; a call already in flight is
    /// allowed to finish, and whatever was gathered up to that point is
    /// still written.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleOutcome {
        self.set_state(ReconcilerState::Polling);
        let outcome = self.cycle(cancel).await;
        self.set_state(ReconcilerState::Idle);
        outcome
    }

    async fn cycle(&self, cancel: &CancellationToken) -> CycleOutcome {
        let batch = match self.repo.orders_batch(&Status::PENDING).await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "failed to load pending orders");
                return CycleOutcome::Failed {
                    polled: 0,
                    reason: e.to_string(),
                };
            }
        };

        if batch.is_empty() {
            debug!("no pending orders");
            return CycleOutcome::Idle;
        }

        let mut polled = 0;
        let mut skipped = 0;
        let mut changed: Vec<Order> = Vec::new();

        for mut order in batch {
            if cancel.is_cancelled() {
                debug!(polled, "cancelled mid-cycle");
                break;
            }

            polled += 1;
            let fresh = match self.source.load(order.number()).await {
                Ok(info) => info,
                Err(e) => {
                    if let Some(after) = e.retry_after() {
                        info!(
                            number = %order.number(),
                            after_secs = after.as_secs(),
                            "accrual source asked to back off; cycle aborted"
                        );
                        return CycleOutcome::Backoff { after, polled };
                    }
                    warn!(number = %order.number(), error = %e, "accrual source failed; cycle aborted");
                    return CycleOutcome::Failed {
                        polled,
                        reason: e.to_string(),
                    };
                }
            };

            match order.apply_update(fresh) {
                Ok(Update::Applied { from, to }) => {
                    debug!(order_id = %order.id(), %from, %to, "status moved");
                    changed.push(order);
                }
                Ok(Update::Unchanged) => {}
                Err(e) => {
                    warn!(order_id = %order.id(), error = %e, "update refused; order skipped");
                    skipped += 1;
                }
            }
        }

        let updated = changed.len();
        if updated > 0 {
            self.set_state(ReconcilerState::Applying);
            if let Err(e) = self.repo.orders_update(&changed).await {
                warn!(error = %e, updated, "failed to persist order updates");
                return CycleOutcome::Failed {
                    polled,
                    reason: e.to_string(),
                };
            }
            info!(polled, updated, skipped, "orders reconciled");
        } else {
            debug!(polled, skipped, "no status changes");
        }

        CycleOutcome::Applied {
            polled,
            updated,
            skipped,
        }
    }
}
