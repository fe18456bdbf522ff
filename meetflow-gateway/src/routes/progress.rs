//! Progress stream for observers and the in-stage report endpoint for
//! collaborators.

use crate::error::ServerError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{self, Stream, StreamExt};
use meetflow::core::{EventPhase, ProgressEvent, TaskError, TaskStatus};
use meetflow::utils::is_valid_task_id;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tracing::{debug, warn};

/// One `data:` frame on the wire.
#[derive(Debug, Serialize)]
struct ProgressFrame<'a> {
    service: &'a str,
    step: EventPhase,
    status: TaskStatus,
    progress: u8,
    #[serde(rename = "final")]
    is_final: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a TaskError>,
    task_id: &'a str,
    ts: f64,
}

impl<'a> From<&'a ProgressEvent> for ProgressFrame<'a> {
    fn from(event: &'a ProgressEvent) -> Self {
        Self {
            service: &event.service,
            step: event.phase,
            status: event.status,
            progress: event.progress,
            is_final: event.is_final,
            error: event.error.as_ref(),
            task_id: &event.task_id,
            ts: event.ts,
        }
    }
}

fn frame(event: &ProgressEvent) -> Event {
    Event::default()
        .json_data(ProgressFrame::from(event))
        .unwrap_or_else(|e| {
            warn!(task_id = %event.task_id, error = %e, "failed to encode progress frame");
            Event::default().comment("encode error")
        })
}

/// `GET /progress/stream/{task_id}`
///
/// Opens with an `:ok` comment, then one frame per event; the stream ends
/// after the final frame. Disconnecting never affects the pipeline.
pub async fn stream_progress(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    let subscription = state.orchestrator.watch(&task_id).await?;
    debug!(task_id = %task_id, "progress observer attached");

    let opening = stream::once(async { Ok::<_, Infallible>(Event::default().comment("ok")) });
    let frames = subscription.into_stream().map(|event| Ok::<_, Infallible>(frame(&event)));
    Ok(Sse::new(opening.chain(frames)).keep_alive(KeepAlive::default()))
}

/// Body a collaborator posts while its stage runs.
#[derive(Debug, Deserialize)]
pub struct ProgressReport {
    /// Overall task percentage; clamped into the stage's window.
    pub progress: f64,
}

/// Acknowledgement of a progress report.
#[derive(Debug, Serialize)]
pub struct ReportAck {
    pub ok: bool,
    /// Progress as published; absent when the stage had already moved on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

/// `POST /progress/{task_id}`
///
/// Publishes a non-final event on the task's stream; the task record is
/// not touched.
pub async fn report_progress(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(report): Json<ProgressReport>,
) -> Result<Json<ReportAck>, ServerError> {
    if !is_valid_task_id(&task_id) {
        return Err(ServerError::BadRequest(format!("invalid task id {task_id:?}")));
    }
    let published = state.orchestrator.report_progress(&task_id, report.progress)?;
    Ok(Json(ReportAck {
        ok: true,
        progress: published.map(|event| event.progress),
    }))
}
