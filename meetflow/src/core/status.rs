//! Task status and pipeline stage enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a task.
///
/// Non-terminal statuses are ordered: a task only ever moves forward
/// through them, or drops to [`TaskStatus::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted, no stage started yet.
    #[default]
    Queued,
    /// Audio normalization running.
    Preprocessing,
    /// Voice-activity segmentation running.
    Vad,
    /// Speaker diarization running.
    Diarizing,
    /// Speech-to-text running.
    Transcribing,
    /// Summarization running.
    Summarizing,
    /// All stages finished.
    Done,
    /// A stage failed fatally.
    Error,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TaskStatus {
    /// Returns the wire name of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Preprocessing => "preprocessing",
            Self::Vad => "vad",
            Self::Diarizing => "diarizing",
            Self::Transcribing => "transcribing",
            Self::Summarizing => "summarizing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// Returns true for `done` and `error`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Position in the fixed stage order. `Error` has no position.
    #[must_use]
    pub const fn rank(&self) -> Option<u8> {
        match self {
            Self::Queued => Some(0),
            Self::Preprocessing => Some(1),
            Self::Vad => Some(2),
            Self::Diarizing => Some(3),
            Self::Transcribing => Some(4),
            Self::Summarizing => Some(5),
            Self::Done => Some(6),
            Self::Error => None,
        }
    }

    /// Checks whether moving from `self` to `next` is allowed.
    ///
    /// Staying put is allowed for non-terminal statuses (field updates
    /// inside a stage). Forward moves go one stage at a time; the only skip
    /// is `preprocessing -> diarizing` when voice segmentation is off.
    /// `error` is reachable from anything non-terminal.
    ///
    /// # Errors
    ///
    /// Returns a short reason when the transition is rejected.
    pub fn check_transition(self, next: Self) -> Result<(), &'static str> {
        if self.is_terminal() {
            return Err("task is already terminal");
        }
        if next == Self::Error || next == self {
            return Ok(());
        }
        if next == Self::Done && self != Self::Summarizing {
            return Err("done is only reachable from summarizing");
        }
        if self == Self::Preprocessing && next == Self::Diarizing {
            return Ok(());
        }
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) if to == from + 1 => Ok(()),
            _ => Err("status must follow the stage order"),
        }
    }
}

/// One ordered step of the pipeline, performed by an external collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Audio normalization.
    Preprocessing,
    /// Voice-activity segmentation (optional).
    Vad,
    /// Speaker diarization.
    Diarizing,
    /// Speech-to-text.
    Transcribing,
    /// Summarization.
    Summarizing,
}

impl PipelineStage {
    /// All stages in execution order.
    pub const ALL: [Self; 5] = [
        Self::Preprocessing,
        Self::Vad,
        Self::Diarizing,
        Self::Transcribing,
        Self::Summarizing,
    ];

    /// The task status while this stage runs.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        match self {
            Self::Preprocessing => TaskStatus::Preprocessing,
            Self::Vad => TaskStatus::Vad,
            Self::Diarizing => TaskStatus::Diarizing,
            Self::Transcribing => TaskStatus::Transcribing,
            Self::Summarizing => TaskStatus::Summarizing,
        }
    }

    /// Stage name as recorded in `current_stage` and error details.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        self.status().as_str()
    }

    /// Name of the collaborator service that performs the stage.
    #[must_use]
    pub const fn service_name(&self) -> &'static str {
        match self {
            Self::Preprocessing => "preprocess",
            Self::Vad => "vad",
            Self::Diarizing => "diarization",
            Self::Transcribing => "whisper",
            Self::Summarizing => "summarization",
        }
    }

    /// Prefix used for per-stage environment variables.
    #[must_use]
    pub const fn env_prefix(&self) -> &'static str {
        match self {
            Self::Preprocessing => "PREPROCESS",
            Self::Vad => "VAD",
            Self::Diarizing => "DIARIZATION",
            Self::Transcribing => "WHISPER",
            Self::Summarizing => "SUMMARIZATION",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
