//! The task record and its artifacts.

use crate::core::TaskStatus;
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Category of a file produced (or received) for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// The uploaded media file.
    Source,
    /// Normalized audio produced by preprocessing.
    Converted,
    /// Voice-activity segments (JSON).
    Segments,
    /// Speaker turns (JSON).
    Diarization,
    /// Plain-text transcript.
    Transcript,
    /// Word-level timings, when the transcriber provides them.
    Words,
    /// Speaker-attributed utterances, when the transcriber provides them.
    Utterances,
    /// Generated summary.
    Summary,
}

impl ArtifactKind {
    /// Categories served by the download endpoint.
    pub const DOWNLOADABLE: [Self; 4] = [
        Self::Source,
        Self::Converted,
        Self::Transcript,
        Self::Summary,
    ];

    /// Wire name of the artifact kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Converted => "converted",
            Self::Segments => "segments",
            Self::Diarization => "diarization",
            Self::Transcript => "transcript",
            Self::Words => "words",
            Self::Utterances => "utterances",
            Self::Summary => "summary",
        }
    }

    /// Returns true if the download endpoint serves this kind.
    #[must_use]
    pub fn is_downloadable(&self) -> bool {
        Self::DOWNLOADABLE.contains(self)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown artifact kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown artifact kind: {0}")]
pub struct UnknownArtifactKind(pub String);

impl FromStr for ArtifactKind {
    type Err = UnknownArtifactKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" => Ok(Self::Source),
            "converted" => Ok(Self::Converted),
            "segments" => Ok(Self::Segments),
            "diarization" => Ok(Self::Diarization),
            "transcript" => Ok(Self::Transcript),
            "words" => Ok(Self::Words),
            "utterances" => Ok(Self::Utterances),
            "summary" => Ok(Self::Summary),
            other => Err(UnknownArtifactKind(other.to_string())),
        }
    }
}

/// Structured failure detail recorded on a task in `error` status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// Stage that failed.
    pub stage: String,
    /// Human-readable cause.
    pub message: String,
}

impl TaskError {
    /// Creates a new task error.
    #[must_use]
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.message)
    }
}

/// One submitted meeting file's end-to-end processing job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Opaque unique identifier.
    pub id: String,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Stage currently executing, or the one that last failed.
    pub current_stage: String,
    /// Percentage complete, 0 to 100.
    pub progress: u8,
    /// Output files keyed by artifact kind.
    #[serde(default)]
    pub paths: BTreeMap<ArtifactKind, PathBuf>,
    /// Failure detail, present only in `error` status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    /// SHA-256 of the uploaded file, hex encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_sha256: Option<String>,
    /// When the task was submitted.
    pub created_at: Timestamp,
    /// Refreshed on every transition.
    pub updated_at: Timestamp,
}

impl Task {
    /// Creates a queued task.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let now = now_utc();
        Self {
            id: id.into(),
            status: TaskStatus::Queued,
            current_stage: TaskStatus::Queued.as_str().to_string(),
            progress: 0,
            paths: BTreeMap::new(),
            error: None,
            source_sha256: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true once the task reached `done` or `error`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns the recorded path for an artifact kind.
    #[must_use]
    pub fn path(&self, kind: ArtifactKind) -> Option<&Path> {
        self.paths.get(&kind).map(PathBuf::as_path)
    }

    /// Records an artifact path.
    pub fn record_path(&mut self, kind: ArtifactKind, path: impl Into<PathBuf>) {
        self.paths.insert(kind, path.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_task_is_queued() {
        let task = Task::new("t1");
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(task.current_stage, "queued");
        assert_eq!(task.progress, 0);
        assert!(task.paths.is_empty());
        assert!(task.error.is_none());
        assert_eq!(task.created_at, task.updated_at);
    }

    #[test]
    fn test_artifact_kind_round_trip_names() {
        for kind in ArtifactKind::DOWNLOADABLE {
            assert_eq!(kind.as_str().parse::<ArtifactKind>().unwrap(), kind);
        }
        assert!("opus".parse::<ArtifactKind>().is_err());
        assert!(!ArtifactKind::Segments.is_downloadable());
    }

    #[test]
    fn test_task_serializes_paths_by_name() {
        let mut task = Task::new("t1");
        task.record_path(ArtifactKind::Converted, "/data/t1/converted/a.opus");
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["paths"]["converted"], "/data/t1/converted/a.opus");
        assert_eq!(json["status"], "queued");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_task_error_display() {
        let err = TaskError::new("transcribing", "timed out");
        assert_eq!(err.to_string(), "transcribing: timed out");
    }
}
