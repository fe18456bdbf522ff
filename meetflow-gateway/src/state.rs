//! Shared application state injected into every handler.

use crate::config::GatewayConfig;
use meetflow::pipeline::Orchestrator;
use std::sync::Arc;

/// State shared by all routes.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Gateway settings.
    pub config: Arc<GatewayConfig>,
    /// The pipeline engine.
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(config: GatewayConfig, orchestrator: Orchestrator) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator,
        }
    }
}
