//! JSON-file result store: one document per task.

use super::{ResultStore, TaskRecord};
use crate::errors::StoreError;
use crate::workarea::sanitize_file_name;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Stores each record as `<dir>/<task_id>.json`.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// reader never sees a half-written record.
#[derive(Debug, Clone)]
pub struct FileResultStore {
    dir: PathBuf,
}

impl FileResultStore {
    /// Creates a store writing into `dir` (created on first save).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The storage directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, task_id: &str) -> Result<PathBuf, StoreError> {
        match sanitize_file_name(task_id) {
            Some(name) if name == task_id && !name.starts_with('.') => {
                Ok(self.dir.join(format!("{name}.json")))
            }
            _ => Err(StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unusable task id {task_id:?}"),
            ))),
        }
    }
}

#[async_trait]
impl ResultStore for FileResultStore {
    async fn save(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let path = self.record_path(&record.task_id)?;
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(record)?;

        fs::create_dir_all(&self.dir).await?;
        fs::write(&tmp, body).await?;
        if let Err(err) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        let Ok(path) = self.record_path(task_id) else {
            return Ok(None);
        };
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ArtifactKind, Task, TaskStatus};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_save_and_get() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileResultStore::new(tmp.path().join("records"));

        let mut task = Task::new("20250101120000_0123456789abcdef0123456789abcdef");
        task.status = TaskStatus::Done;
        task.progress = 100;
        task.record_path(ArtifactKind::Transcript, "/d/x/transcript/a.txt");
        let record = TaskRecord::from(&task);

        store.save(&record).await.unwrap();
        let loaded = store.get(&task.id).await.unwrap();
        assert_eq!(loaded, Some(record));

        let files: Vec<_> = std::fs::read_dir(store.dir()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_record() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileResultStore::new(tmp.path());
        let mut task = Task::new("t1");
        store.save(&TaskRecord::from(&task)).await.unwrap();
        task.progress = 40;
        store.save(&TaskRecord::from(&task)).await.unwrap();
        assert_eq!(store.get("t1").await.unwrap().unwrap().progress, 40);
    }

    #[tokio::test]
    async fn test_missing_and_hostile_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileResultStore::new(tmp.path());
        assert!(store.get("nope").await.unwrap().is_none());
        assert!(store.get("../etc/passwd").await.unwrap().is_none());

        let task = Task::new("../escape");
        assert!(store.save(&TaskRecord::from(&task)).await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("t1.json"), b"{not json").unwrap();
        let store = FileResultStore::new(tmp.path());
        assert!(matches!(
            store.get("t1").await,
            Err(StoreError::Serialization(_))
        ));
    }
}
