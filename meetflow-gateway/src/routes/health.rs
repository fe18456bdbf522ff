//! Collaborator health report.

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use meetflow::health::ServiceStatus;

/// `GET /healthcheck`
///
/// Always 200; one entry per configured collaborator.
pub async fn healthcheck(State(state): State<AppState>) -> Json<Vec<ServiceStatus>> {
    Json(state.orchestrator.health().await)
}
