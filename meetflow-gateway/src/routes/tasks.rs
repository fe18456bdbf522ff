//! Task status lookup.

use crate::error::ServerError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use meetflow::store::TaskRecord;

/// `GET /tasks/{task_id}`
///
/// Live record from the registry, else the persisted one.
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskRecord>, ServerError> {
    let task = state.orchestrator.task(&task_id).await?;
    Ok(Json(TaskRecord::from(&task)))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{app, body_json, get};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn unknown_task_is_404() {
        let app = app();
        let response = app
            .router
            .oneshot(get("/tasks/20240101000000_0123456789abcdef0123456789abcdef"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert!(body["detail"].as_str().unwrap().contains("not found"));
    }
}
