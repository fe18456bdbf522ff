//! In-memory result store.

use super::{ResultStore, TaskRecord};
use crate::errors::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;

/// Keeps records in a concurrent map. Lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    records: DashMap<String, TaskRecord>,
}

impl InMemoryResultStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn save(&self, record: &TaskRecord) -> Result<(), StoreError> {
        self.records.insert(record.task_id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.records.get(task_id).map(|r| r.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Task, TaskStatus};

    #[tokio::test]
    async fn test_save_is_upsert() {
        let store = InMemoryResultStore::new();
        let mut task = Task::new("t1");
        store.save(&TaskRecord::from(&task)).await.unwrap();

        task.status = TaskStatus::Done;
        task.progress = 100;
        store.save(&TaskRecord::from(&task)).await.unwrap();

        assert_eq!(store.len(), 1);
        let loaded = store.get("t1").await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Done);
        assert!(store.get("missing").await.unwrap().is_none());
    }
}
