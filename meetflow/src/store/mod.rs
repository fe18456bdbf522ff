//! Durable storage of final task records.
//!
//! The orchestrator writes one [`TaskRecord`] per task once it reaches a
//! terminal state. Saving is an upsert keyed by task id.

mod file;
mod memory;

pub use file::FileResultStore;
pub use memory::InMemoryResultStore;

use crate::core::{ArtifactKind, Task, TaskError, TaskStatus};
use crate::errors::StoreError;
use crate::utils::Timestamp;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// The persisted form of a finished task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task identifier.
    pub task_id: String,
    /// Terminal status.
    pub status: TaskStatus,
    /// Last stage that ran.
    pub current_stage: String,
    /// Final progress.
    pub progress: u8,
    /// Artifact paths.
    #[serde(default)]
    pub paths: BTreeMap<ArtifactKind, PathBuf>,
    /// Failure detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    /// SHA-256 of the upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_sha256: Option<String>,
    /// Submission time.
    pub created_at: Timestamp,
    /// Last transition time.
    pub updated_at: Timestamp,
}

impl From<&Task> for TaskRecord {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            status: task.status,
            current_stage: task.current_stage.clone(),
            progress: task.progress,
            paths: task.paths.clone(),
            error: task.error.clone(),
            source_sha256: task.source_sha256.clone(),
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

impl From<TaskRecord> for Task {
    fn from(record: TaskRecord) -> Self {
        Self {
            id: record.task_id,
            status: record.status,
            current_stage: record.current_stage,
            progress: record.progress,
            paths: record.paths,
            error: record.error,
            source_sha256: record.source_sha256,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Backend for final task records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Inserts or replaces the record of `record.task_id`.
    async fn save(&self, record: &TaskRecord) -> Result<(), StoreError>;

    /// Loads a record, `None` if it was never saved.
    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError>;
}
