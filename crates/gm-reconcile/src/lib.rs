//! gm-reconcile
//!
//! Background reconciliation of pending orders against the accrual source.
//!
//! - One cycle pulls every `New`/`Processing` order, asks the source about
//!   each, and writes back the ones whose status moved, in a single batch.
//! - A retryable source error aborts the cycle; the next cycle starts after
//!   the source's `Retry-After` instead of the regular interval.
//! - Any other failure is logged and the loop carries on at the regular
//!   interval. Nothing a cycle does can end the task.
//! - The task stops when its [`tokio_util::sync::CancellationToken`] fires.
//!   Stopping is idempotent.

mod engine;
mod task;

pub use engine::{CycleOutcome, Reconciler, ReconcilerConfig, ReconcilerState, DEFAULT_INTERVAL};
pub use task::{ReconcilerHandle, ShutdownOutcome};
