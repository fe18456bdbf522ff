//! Core domain model types.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Task status and pipeline stage enums
//! - The task record and its artifacts
//! - Progress events

mod event;
mod status;
mod task;

pub use event::{EventPhase, ProgressEvent, GATEWAY_SERVICE};
pub use status::{PipelineStage, TaskStatus};
pub use task::{ArtifactKind, Task, TaskError, UnknownArtifactKind};
