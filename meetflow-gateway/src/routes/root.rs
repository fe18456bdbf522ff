//! Gateway liveness.

use axum::Json;
use serde_json::{json, Value};

/// `GET /`
pub async fn index() -> Json<Value> {
    Json(json!({ "status": "gateway running" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_running() {
        let Json(body) = index().await;
        assert_eq!(body["status"], "gateway running");
    }
}
