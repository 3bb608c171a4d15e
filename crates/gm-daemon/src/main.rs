//! gm-daemon entry point.
//!
//! Sets up tracing, loads configuration, wires the Postgres repository, the
//! accrual source and the reconciler, and serves HTTP until Ctrl-C / SIGTERM.
//! All route handlers live in `routes.rs`; shared state and startup helpers
//! live in `state.rs`.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gm_config::{AppConfig, Overrides};
use gm_core::OrderRepository;
use gm_daemon::{routes, state};
use gm_db::PgOrderRepository;
use gm_reconcile::ShutdownOutcome;
use gm_service::OrderService;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "gm-daemon")]
#[command(about = "Loyalty order accrual daemon", long_about = None)]
struct Cli {
    /// Address the HTTP server binds (host:port). Env RUN_ADDRESS wins.
    #[arg(short = 'a', long = "address")]
    run_address: Option<String>,

    /// Postgres connection string. Env DATABASE_URI wins.
    #[arg(short = 'd', long = "database-uri")]
    database_uri: Option<String>,

    /// Accrual system address. Env ACCRUAL_SYSTEM_ADDRESS wins.
    #[arg(short = 'r', long = "accrual-address")]
    accrual_address: Option<String>,

    /// YAML config layers, merged in order.
    #[arg(short = 'c', long = "config")]
    config: Vec<String>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            run_address: self.run_address.clone(),
            database_uri: self.database_uri.clone(),
            accrual_address: self.accrual_address.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience).
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();
    let paths: Vec<&str> = cli.config.iter().map(String::as_str).collect();
    let cfg = AppConfig::load(&paths, &cli.overrides(), &Overrides::from_env())?;
    info!(config = ?cfg, "configuration loaded");

    let pool = gm_db::connect(cfg.require_database_uri()?).await?;
    gm_db::migrate(&pool).await?;

    let repo: Arc<dyn OrderRepository> = Arc::new(PgOrderRepository::new(pool.clone()));
    let source = state::build_source(&cfg)?;

    let shutdown = CancellationToken::new();
    let reconciler =
        state::spawn_reconciler(repo.clone(), source.clone(), &cfg, shutdown.child_token());

    let service = Arc::new(OrderService::new(repo, source));
    let shared = Arc::new(state::AppState::new(service).with_reconciler(reconciler.subscribe()));

    let app = routes::build_router(shared).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let listener = tokio::net::TcpListener::bind(&cfg.run_address)
        .await
        .with_context(|| format!("failed to bind {}", cfg.run_address))?;
    info!("gm-daemon listening on http://{}", cfg.run_address);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("server crashed");

    // Stop the reconciler whether the server exited cleanly or not.
    shutdown.cancel();
    match reconciler.shutdown(cfg.shutdown_grace()).await {
        ShutdownOutcome::Stopped => info!("reconciler stopped"),
        ShutdownOutcome::Aborted => warn!("reconciler aborted after grace period"),
        ShutdownOutcome::Panicked => warn!("reconciler had panicked"),
    }
    pool.close().await;

    served
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Resolves on Ctrl-C, SIGTERM (unix), or when `cancel` fires.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }
    info!("shutdown requested");
}
