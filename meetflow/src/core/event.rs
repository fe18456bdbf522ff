//! Progress events pushed to task observers.

use crate::core::{PipelineStage, Task, TaskError, TaskStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Service name used for events not tied to a collaborator.
pub const GATEWAY_SERVICE: &str = "gateway";

/// What happened at a stage boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPhase {
    /// Task accepted.
    Queued,
    /// A stage call is about to be issued.
    Started,
    /// A collaborator reported progress from inside its stage.
    Running,
    /// A stage finished and its outputs were recorded.
    Completed,
    /// A stage failed fatally; the task is in `error`.
    Failed,
    /// The pipeline finished.
    Done,
}

impl fmt::Display for EventPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Started => "started",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// A transient notification of a stage transition for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Task the event belongs to.
    pub task_id: String,
    /// Stage name (or task status for queued/done events).
    pub stage: String,
    /// Collaborator that performs the stage.
    pub service: String,
    /// Boundary kind.
    pub phase: EventPhase,
    /// Task status after the transition.
    pub status: TaskStatus,
    /// Task progress after the transition.
    pub progress: u8,
    /// Set on the last event of a task.
    #[serde(rename = "final")]
    pub is_final: bool,
    /// Failure detail for failed events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    /// Unix seconds when the event was produced.
    pub ts: f64,
}

impl ProgressEvent {
    fn base(task: &Task, stage: &str, service: &str, phase: EventPhase) -> Self {
        Self {
            task_id: task.id.clone(),
            stage: stage.to_string(),
            service: service.to_string(),
            phase,
            status: task.status,
            progress: task.progress,
            is_final: false,
            error: None,
            ts: crate::utils::unix_seconds(),
        }
    }

    /// Event for a freshly accepted task.
    #[must_use]
    pub fn queued(task: &Task) -> Self {
        Self::base(task, TaskStatus::Queued.as_str(), GATEWAY_SERVICE, EventPhase::Queued)
    }

    /// Event for a stage about to run.
    #[must_use]
    pub fn started(task: &Task, stage: PipelineStage) -> Self {
        Self::base(task, stage.as_str(), stage.service_name(), EventPhase::Started)
    }

    /// Event for progress reported from inside a running stage.
    ///
    /// Carries `progress` instead of the recorded task progress.
    #[must_use]
    pub fn running(task: &Task, stage: PipelineStage, progress: u8) -> Self {
        let mut event = Self::base(task, stage.as_str(), stage.service_name(), EventPhase::Running);
        event.progress = progress;
        event
    }

    /// Event for a stage that finished.
    #[must_use]
    pub fn completed(task: &Task, stage: PipelineStage) -> Self {
        Self::base(task, stage.as_str(), stage.service_name(), EventPhase::Completed)
    }

    /// Final event for a task that failed at `stage`.
    #[must_use]
    pub fn failed(task: &Task, stage: PipelineStage) -> Self {
        let mut event = Self::base(task, stage.as_str(), stage.service_name(), EventPhase::Failed);
        event.is_final = true;
        event.error = task.error.clone();
        event
    }

    /// Final event for a finished task.
    #[must_use]
    pub fn done(task: &Task) -> Self {
        let mut event = Self::base(task, TaskStatus::Done.as_str(), GATEWAY_SERVICE, EventPhase::Done);
        event.is_final = true;
        event
    }

    /// Best-effort event describing the current state of `task`.
    ///
    /// Used for observers that attach after the live channel is gone.
    #[must_use]
    pub fn snapshot(task: &Task) -> Self {
        match task.status {
            TaskStatus::Done => Self::done(task),
            TaskStatus::Queued => Self::queued(task),
            TaskStatus::Error => {
                let service = PipelineStage::ALL
                    .iter()
                    .find(|s| s.as_str() == task.current_stage)
                    .map_or(GATEWAY_SERVICE, PipelineStage::service_name);
                let mut event = Self::base(task, &task.current_stage, service, EventPhase::Failed);
                event.is_final = true;
                event.error = task.error.clone();
                event
            }
            running => {
                let stage = PipelineStage::ALL
                    .into_iter()
                    .find(|s| s.status() == running)
                    .unwrap_or(PipelineStage::Preprocessing);
                Self::started(task, stage)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_field_name_on_wire() {
        let task = Task::new("t1");
        let json = serde_json::to_value(ProgressEvent::queued(&task)).unwrap();
        assert_eq!(json["final"], false);
        assert_eq!(json["service"], "gateway");
        assert_eq!(json["phase"], "queued");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_failed_event_carries_error() {
        let mut task = Task::new("t1");
        task.status = TaskStatus::Error;
        task.current_stage = "transcribing".into();
        task.error = Some(TaskError::new("transcribing", "timeout"));

        let event = ProgressEvent::failed(&task, PipelineStage::Transcribing);
        assert!(event.is_final);
        assert_eq!(event.service, "whisper");
        assert_eq!(event.error.as_ref().map(|e| e.stage.as_str()), Some("transcribing"));
    }

    #[test]
    fn test_snapshot_of_error_task() {
        let mut task = Task::new("t1");
        task.status = TaskStatus::Error;
        task.current_stage = "diarizing".into();
        task.error = Some(TaskError::new("diarizing", "no speech"));

        let event = ProgressEvent::snapshot(&task);
        assert_eq!(event.phase, EventPhase::Failed);
        assert_eq!(event.service, "diarization");
        assert!(event.is_final);
    }

    #[test]
    fn test_running_event_overrides_progress() {
        let mut task = Task::new("t1");
        task.status = TaskStatus::Transcribing;
        task.progress = 60;

        let event = ProgressEvent::running(&task, PipelineStage::Transcribing, 72);
        assert_eq!(event.phase, EventPhase::Running);
        assert_eq!(event.progress, 72);
        assert_eq!(event.service, "whisper");
        assert!(!event.is_final);
        assert_eq!(serde_json::to_value(&event).unwrap()["phase"], "running");
    }

    #[test]
    fn test_snapshot_of_running_task() {
        let mut task = Task::new("t1");
        task.status = TaskStatus::Transcribing;
        task.progress = 60;

        let event = ProgressEvent::snapshot(&task);
        assert_eq!(event.phase, EventPhase::Started);
        assert_eq!(event.stage, "transcribing");
        assert_eq!(event.progress, 60);
        assert!(!event.is_final);
    }
}
