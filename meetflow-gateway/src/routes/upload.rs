//! Media upload.

use crate::error::ServerError;
use crate::state::AppState;
use axum::extract::{Multipart, State};
use axum::Json;
use futures::StreamExt;
use serde::Serialize;
use std::io;
use tracing::{debug, info};

/// Body of a successful upload.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub task_id: String,
}

/// `POST /uploadfile/`
///
/// Streams the `file` field into the engine and returns as soon as the task
/// is queued; the pipeline outcome is only visible on the progress stream.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            debug!(field = ?field.name(), "skipping multipart field");
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_owned)
            .ok_or_else(|| ServerError::BadRequest("file field has no file name".to_owned()))?;

        let content = field.map(|chunk| chunk.map_err(io::Error::other));
        let task_id = state.orchestrator.submit(&file_name, content).await?;
        info!(task_id = %task_id, file = %file_name, "upload accepted");
        return Ok(Json(UploadResponse { task_id }));
    }
    Err(ServerError::BadRequest("missing multipart field \"file\"".to_owned()))
}
