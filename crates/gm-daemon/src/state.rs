//! Shared runtime state for gm-daemon, plus the startup helpers that build
//! the accrual source and the reconciler from configuration.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum.

use std::sync::Arc;

use gm_accrual::{FakeAccrualSource, HttpAccrualSource};
use gm_config::AppConfig;
use gm_core::{AccrualSource, OrderRepository};
use gm_reconcile::{Reconciler, ReconcilerConfig, ReconcilerHandle, ReconcilerState};
use gm_service::OrderService;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            service: "gm-daemon",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Shared handle for all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub build: BuildInfo,
    pub service: Arc<OrderService>,
    /// Live view of the background reconciler, when one is running.
    pub reconciler: Option<watch::Receiver<ReconcilerState>>,
}

impl AppState {
    pub fn new(service: Arc<OrderService>) -> Self {
        Self {
            build: BuildInfo::default(),
            service,
            reconciler: None,
        }
    }

    pub fn with_reconciler(mut self, state: watch::Receiver<ReconcilerState>) -> Self {
        self.reconciler = Some(state);
        self
    }

    pub fn reconciler_state(&self) -> Option<ReconcilerState> {
        self.reconciler.as_ref().map(|rx| *rx.borrow())
    }
}

// ---------------------------------------------------------------------------
// Startup helpers
// ---------------------------------------------------------------------------

/// The accrual source selected by configuration.
pub fn build_source(cfg: &AppConfig) -> anyhow::Result<Arc<dyn AccrualSource>> {
    if cfg.accrual_client.fake {
        warn!("using the randomised fake accrual source");
        return Ok(Arc::new(FakeAccrualSource));
    }

    let source = HttpAccrualSource::with_options(
        &cfg.accrual_address,
        cfg.accrual_timeout(),
        cfg.reconcile.default_retry_after_secs,
    )?;
    info!(base_url = source.base_url(), "accrual source configured");
    Ok(Arc::new(source))
}

/// Spawn the background reconciler on the current runtime.
pub fn spawn_reconciler(
    repo: Arc<dyn OrderRepository>,
    source: Arc<dyn AccrualSource>,
    cfg: &AppConfig,
    cancel: CancellationToken,
) -> ReconcilerHandle {
    let config = ReconcilerConfig {
        interval: cfg.reconcile_interval(),
    };
    Reconciler::new(repo, source, config).spawn(cancel)
}
