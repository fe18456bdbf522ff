//! meetflow-gateway: HTTP edge of the meeting pipeline.
//!
//! Startup order:
//! 1. Load configuration from environment variables.
//! 2. Initialise tracing.
//! 3. Build the orchestrator over the HTTP transport and file result store.
//! 4. Serve the router until SIGINT/SIGTERM, then drain in-flight pipelines.

mod config;
mod error;
mod routes;
mod state;

use meetflow::invoker::HttpTransport;
use meetflow::observability::init_tracing;
use meetflow::pipeline::Orchestrator;
use meetflow::store::FileResultStore;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::state::AppState;

/// Directory under `DATA_DIR` holding persisted task records.
const RECORDS_DIR: &str = "records";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = GatewayConfig::from_env()?;
    init_tracing(&cfg.pipeline.log);
    info!(version = env!("CARGO_PKG_VERSION"), "meetflow-gateway starting");

    let store = FileResultStore::new(cfg.pipeline.data_dir.join(RECORDS_DIR));
    let orchestrator = Orchestrator::builder(cfg.pipeline.clone(), Arc::new(HttpTransport::new()))
        .with_store(Arc::new(store))
        .build();
    info!(
        data_dir = %cfg.pipeline.data_dir.display(),
        stages = ?cfg.pipeline.enabled_stages(),
        "orchestrator ready"
    );

    let addr = cfg.bind_address;
    let state = AppState::new(cfg, orchestrator.clone());
    let app = routes::build(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    orchestrator.shutdown().await;
    info!("meetflow-gateway stopped");
    Ok(())
}

/// Resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("shutdown signal received; draining");
}
