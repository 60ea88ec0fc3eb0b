//! Result Store (§2.1 / §5): write-once map from task id to `TaskResult`.
//! Writes are exclusive per key; reads return defensive clones and never
//! block a writer, per the "Task result map under contention → lock-free
//! reads" design note. `DashMap` gives per-shard locking rather than one
//! crate-wide mutex.

use crate::model::{TaskId, TaskResult};
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct ResultStore {
    inner: DashMap<TaskId, TaskResult>,
}

/// A task result was written twice for the same id — violates the
/// write-once invariant (§3) and indicates an engine bug, not user error.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("task {0} already has a result recorded")]
pub struct DuplicateResult(pub TaskId);

impl ResultStore {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    pub fn insert(&self, result: TaskResult) -> Result<(), DuplicateResult> {
        let id = result.task_id;
        if self.inner.contains_key(&id) {
            return Err(DuplicateResult(id));
        }
        self.inner.insert(id, result);
        Ok(())
    }

    /// A defensive clone of the completed result, or `None` if the task
    /// has not finished (or does not exist) yet.
    pub fn get(&self, id: TaskId) -> Option<TaskResult> {
        self.inner.get(&id).map(|r| r.clone())
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.inner.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.inner.iter().map(|e| *e.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::model::OutputCapture;

    fn dummy(id: TaskId) -> TaskResult {
        let now = Utc::now();
        TaskResult {
            task_id: id,
            exit_code: 0,
            stdout: OutputCapture::Inline(String::new()),
            stderr: OutputCapture::Inline(String::new()),
            success: true,
            started_at: now,
            finished_at: now,
            attempts: 1,
            skipped: false,
            error_kind: None,
        }
    }

    #[test]
    fn write_once() {
        let store = ResultStore::new();
        store.insert(dummy(1)).unwrap();
        assert!(store.insert(dummy(1)).is_err());
    }

    #[test]
    fn unrecorded_task_has_no_entry() {
        let store = ResultStore::new();
        assert!(store.get(42).is_none());
        assert!(!store.contains(42));
    }
}
