//! Authoritative in-memory task records.
//!
//! Each task lives behind its own mutex inside a concurrent map, so
//! mutations of one task are serialized while different tasks never wait
//! on each other beyond the brief map-shard lookup.

use crate::core::{Task, TaskStatus};
use crate::errors::RegistryError;
use crate::utils::now_utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

type Slot = Arc<Mutex<Task>>;

/// Thread-safe store of task records.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: DashMap<String, Slot>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a queued task record.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateId`] if `id` is already present.
    pub fn create(&self, id: &str) -> Result<Task, RegistryError> {
        match self.tasks.entry(id.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::duplicate(id)),
            Entry::Vacant(vacant) => {
                let task = Task::new(id);
                vacant.insert(Arc::new(Mutex::new(task.clone())));
                Ok(task)
            }
        }
    }

    /// Returns a snapshot of a task.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if `id` is unknown.
    pub fn get(&self, id: &str) -> Result<Task, RegistryError> {
        let slot = self.slot(id)?;
        let task = slot.lock().clone();
        Ok(task)
    }

    /// Applies `mutation` as one atomic read-modify-write.
    ///
    /// The mutation runs on a copy; the copy is committed only if it obeys
    /// the lifecycle rules, and `updated_at` is refreshed on commit.
    /// Returns the committed snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if `id` is unknown and
    /// [`RegistryError::InvalidTransition`] if the task is terminal or the
    /// mutated record breaks a rule.
    pub fn update<F>(&self, id: &str, mutation: F) -> Result<Task, RegistryError>
    where
        F: FnOnce(&mut Task),
    {
        let slot = self.slot(id)?;
        let mut current = slot.lock();

        if current.is_terminal() {
            return Err(RegistryError::invalid_transition(
                id,
                current.status,
                current.status,
                "task is already terminal",
            ));
        }

        let mut next = current.clone();
        mutation(&mut next);
        validate(&current, &next)?;

        let now = now_utc();
        next.updated_at = now.max(current.updated_at);
        *current = next.clone();
        Ok(next)
    }

    /// Returns true if a task with this id exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    /// Returns the number of tracked tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no tasks are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    // The shard guard is dropped before the task mutex is taken.
    fn slot(&self, id: &str) -> Result<Slot, RegistryError> {
        self.tasks
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RegistryError::not_found(id))
    }
}

fn validate(current: &Task, next: &Task) -> Result<(), RegistryError> {
    let reject = |reason: &str| {
        Err(RegistryError::invalid_transition(
            &current.id,
            current.status,
            next.status,
            reason,
        ))
    };

    if next.id != current.id || next.created_at != current.created_at {
        return reject("identity fields are immutable");
    }
    if let Err(reason) = current.status.check_transition(next.status) {
        return reject(reason);
    }
    if next.progress > 100 {
        return reject("progress above 100");
    }
    if next.status != TaskStatus::Error && next.progress < current.progress {
        return reject("progress must not decrease");
    }
    let paths_kept = current
        .paths
        .iter()
        .all(|(kind, path)| next.paths.get(kind) == Some(path));
    if !paths_kept {
        return reject("recorded paths cannot be removed or rewritten");
    }
    match (next.status == TaskStatus::Error, next.error.is_some()) {
        (true, false) => reject("error status requires error detail"),
        (false, true) => reject("error detail is only allowed in error status"),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ArtifactKind, TaskError};
    use std::thread;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_create_and_get() {
        let registry = TaskRegistry::new();
        let task = assert_ok!(registry.create("t1"));
        assert_eq!(task.status, TaskStatus::Queued);

        let fetched = assert_ok!(registry.get("t1"));
        assert_eq!(fetched, task);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_create_duplicate() {
        let registry = TaskRegistry::new();
        assert_ok!(registry.create("t1"));
        let err = assert_err!(registry.create("t1"));
        assert_eq!(err, RegistryError::duplicate("t1"));
    }

    #[test]
    fn test_get_and_update_missing() {
        let registry = TaskRegistry::new();
        assert_eq!(
            registry.get("nope").unwrap_err(),
            RegistryError::not_found("nope")
        );
        assert_eq!(
            registry.update("nope", |_| {}).unwrap_err(),
            RegistryError::not_found("nope")
        );
    }

    #[test]
    fn test_update_refreshes_updated_at() {
        let registry = TaskRegistry::new();
        let created = registry.create("t1").unwrap();
        let updated = registry
            .update("t1", |t| t.status = TaskStatus::Preprocessing)
            .unwrap();
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[test]
    fn test_backward_transition_rejected_and_not_applied() {
        let registry = TaskRegistry::new();
        registry.create("t1").unwrap();
        for status in [TaskStatus::Preprocessing, TaskStatus::Diarizing] {
            registry.update("t1", |t| t.status = status).unwrap();
        }

        let err = registry
            .update("t1", |t| {
                t.status = TaskStatus::Preprocessing;
                t.progress = 90;
            })
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTransition { .. }));

        let task = registry.get("t1").unwrap();
        assert_eq!(task.status, TaskStatus::Diarizing);
        assert_eq!(task.progress, 0);
    }

    #[test]
    fn test_stage_jumps_rejected() {
        let registry = TaskRegistry::new();
        registry.create("t1").unwrap();

        let err = registry
            .update("t1", |t| t.status = TaskStatus::Summarizing)
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTransition { .. }));
        assert_eq!(registry.get("t1").unwrap().status, TaskStatus::Queued);

        registry
            .update("t1", |t| t.status = TaskStatus::Preprocessing)
            .unwrap();
        assert!(registry
            .update("t1", |t| t.status = TaskStatus::Transcribing)
            .is_err());
        assert!(registry.update("t1", |t| t.status = TaskStatus::Done).is_err());

        // voice segmentation may be skipped
        assert_ok!(registry.update("t1", |t| t.status = TaskStatus::Diarizing));
    }

    #[test]
    fn test_terminal_task_is_immutable() {
        let registry = TaskRegistry::new();
        registry.create("t1").unwrap();
        registry
            .update("t1", |t| {
                t.status = TaskStatus::Error;
                t.error = Some(TaskError::new("preprocessing", "bad audio"));
            })
            .unwrap();

        let err = registry.update("t1", |t| t.progress = 10).unwrap_err();
        assert!(err.to_string().contains("already terminal"));
    }

    #[test]
    fn test_progress_cannot_decrease() {
        let registry = TaskRegistry::new();
        registry.create("t1").unwrap();
        registry.update("t1", |t| t.progress = 40).unwrap();
        assert!(registry.update("t1", |t| t.progress = 20).is_err());
        assert!(registry.update("t1", |t| t.progress = 101).is_err());
    }

    #[test]
    fn test_paths_are_append_only() {
        let registry = TaskRegistry::new();
        registry.create("t1").unwrap();
        registry
            .update("t1", |t| t.record_path(ArtifactKind::Source, "/data/t1/raw/a.mp3"))
            .unwrap();

        assert!(registry
            .update("t1", |t| {
                t.paths.remove(&ArtifactKind::Source);
            })
            .is_err());
        assert!(registry
            .update("t1", |t| t.record_path(ArtifactKind::Source, "/elsewhere"))
            .is_err());
        assert!(registry
            .update("t1", |t| t.record_path(ArtifactKind::Converted, "/data/t1/c.opus"))
            .is_ok());
    }

    #[test]
    fn test_error_detail_requires_error_status() {
        let registry = TaskRegistry::new();
        registry.create("t1").unwrap();
        assert!(registry
            .update("t1", |t| t.error = Some(TaskError::new("vad", "x")))
            .is_err());
        assert!(registry
            .update("t1", |t| t.status = TaskStatus::Error)
            .is_err());
    }

    #[test]
    fn test_concurrent_updates_do_not_cross_tasks() {
        let registry = Arc::new(TaskRegistry::new());
        registry.create("a").unwrap();
        registry.create("b").unwrap();

        let handles: Vec<_> = ["a", "b"]
            .into_iter()
            .flat_map(|id| {
                let registry = Arc::clone(&registry);
                (0..4).map(move |worker| {
                    let registry = Arc::clone(&registry);
                    thread::spawn(move || {
                        for step in 0..50u8 {
                            registry
                                .update(id, |t| {
                                    t.progress = t.progress.max(step);
                                    t.current_stage = format!("{id}-{worker}");
                                    t.paths.entry(ArtifactKind::Source).or_insert_with(|| {
                                        format!("/data/{id}/raw/in.mp3").into()
                                    });
                                })
                                .unwrap();
                        }
                    })
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        for id in ["a", "b"] {
            let task = registry.get(id).unwrap();
            assert_eq!(task.progress, 49);
            assert!(task.current_stage.starts_with(id));
            assert_eq!(
                task.path(ArtifactKind::Source).unwrap().to_str().unwrap(),
                format!("/data/{id}/raw/in.mp3")
            );
        }
    }

    #[test]
    fn test_contains_and_len() {
        let registry = TaskRegistry::new();
        assert!(registry.is_empty());
        registry.create("first").unwrap();
        registry.create("second").unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("first"));
        assert!(!registry.contains("third"));
    }
}
