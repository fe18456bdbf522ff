//! Artifact download.

use crate::error::ServerError;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::header::CONTENT_DISPOSITION;
use axum::http::HeaderValue;
use axum::response::Response;
use meetflow::core::ArtifactKind;
use meetflow::utils::is_valid_task_id;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::debug;

/// `GET /download/{task_id}/{category}`
///
/// `category` is one of `source`, `converted`, `transcript`, `summary`.
pub async fn download(
    State(state): State<AppState>,
    Path((task_id, category)): Path<(String, String)>,
    request: Request,
) -> Result<Response, ServerError> {
    if !is_valid_task_id(&task_id) {
        return Err(ServerError::BadRequest(format!("invalid task id {task_id:?}")));
    }
    let kind = category
        .parse::<ArtifactKind>()
        .ok()
        .filter(ArtifactKind::is_downloadable)
        .ok_or_else(|| {
            ServerError::BadRequest(format!(
                "invalid category {category:?}; expected source, converted, transcript or summary"
            ))
        })?;

    let task = state.orchestrator.task(&task_id).await?;
    let path = task
        .path(kind)
        .map(std::path::Path::to_path_buf)
        .ok_or_else(|| ServerError::NotFound(format!("no {kind} file for task {task_id}")))?;
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(ServerError::NotFound(format!("{kind} file for task {task_id} is missing")));
    }
    debug!(task_id = %task_id, kind = %kind, path = %path.display(), "serving artifact");

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("download")
        .replace('"', "");
    let mut response = match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    };
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\"")) {
        response.headers_mut().insert(CONTENT_DISPOSITION, value);
    }
    Ok(response)
}
