//! Task registry.
//!
//! [`TaskStore`] is the single source of truth for task state. The pipeline
//! holds it as `Arc<dyn TaskStore>` so tests (or a future persistent backend)
//! can substitute their own implementation. [`MemoryTaskStore`] is the
//! in-process default.
//!
//! Every method works on whole records under one lock: readers get a cloned
//! snapshot and never observe a half-applied transition.

use crate::error::Doc2PdfError;
use crate::task::{ConversionTask, TaskId, Transition};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Registry of conversion tasks keyed by [`TaskId`].
pub trait TaskStore: Send + Sync {
    /// Register a new task in the `received` state.
    ///
    /// Fails with [`Doc2PdfError::DuplicateTask`] if `id` is registered or
    /// was registered and removed: identifiers are never reused.
    fn create(
        &self,
        id: TaskId,
        original_name: String,
        source_path: PathBuf,
    ) -> Result<ConversionTask, Doc2PdfError>;

    /// Snapshot of one task.
    fn get(&self, id: &TaskId) -> Option<ConversionTask>;

    /// Atomically apply a state-machine transition and return the updated task.
    ///
    /// Only the pipeline worker calls this.
    fn transition(&self, id: &TaskId, transition: Transition) -> Result<ConversionTask, Doc2PdfError>;

    /// Drop the record, returning it, and retire its identifier. Backing
    /// files are the caller's concern.
    fn remove(&self, id: &TaskId) -> Option<ConversionTask>;

    /// Snapshot of every task, oldest first.
    fn list(&self) -> Vec<ConversionTask>;
}

/// In-memory [`TaskStore`] backed by a `RwLock<HashMap>`.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    inner: RwLock<Registry>,
}

/// Live records plus the identifiers of removed ones, under one lock so a
/// `create` racing a `remove` cannot slip a reused id in between.
#[derive(Debug, Default)]
struct Registry {
    tasks: HashMap<TaskId, ConversionTask>,
    retired: HashSet<TaskId>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().tasks.is_empty()
    }

    // A writer that panicked mid-call can only have left a fully applied or
    // untouched record behind, so a poisoned lock is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl TaskStore for MemoryTaskStore {
    fn create(
        &self,
        id: TaskId,
        original_name: String,
        source_path: PathBuf,
    ) -> Result<ConversionTask, Doc2PdfError> {
        let mut registry = self.write();
        if registry.tasks.contains_key(&id) || registry.retired.contains(&id) {
            return Err(Doc2PdfError::DuplicateTask { id });
        }
        let task = ConversionTask::new(id.clone(), original_name, source_path);
        registry.tasks.insert(id, task.clone());
        Ok(task)
    }

    fn get(&self, id: &TaskId) -> Option<ConversionTask> {
        self.read().tasks.get(id).cloned()
    }

    fn transition(&self, id: &TaskId, transition: Transition) -> Result<ConversionTask, Doc2PdfError> {
        let mut registry = self.write();
        let task = registry
            .tasks
            .get_mut(id)
            .ok_or_else(|| Doc2PdfError::not_found(id.as_str()))?;
        let target = transition.target_status();
        task.apply(transition)?;
        debug!("Task {} -> {}", id, target);
        Ok(task.clone())
    }

    fn remove(&self, id: &TaskId) -> Option<ConversionTask> {
        let mut registry = self.write();
        let removed = registry.tasks.remove(id)?;
        registry.retired.insert(id.clone());
        Some(removed)
    }

    fn list(&self) -> Vec<ConversionTask> {
        let mut all: Vec<ConversionTask> = self.read().tasks.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;
    use std::sync::Arc;

    fn id(s: &str) -> TaskId {
        TaskId::new(s).unwrap()
    }

    fn create(store: &MemoryTaskStore, s: &str) -> ConversionTask {
        store
            .create(id(s), format!("{s}.docx"), PathBuf::from(format!("/up/{s}.docx")))
            .unwrap()
    }

    #[test]
    fn create_then_get_returns_received() {
        let store = MemoryTaskStore::new();
        let created = create(&store, "t1");
        let fetched = store.get(&id("t1")).unwrap();
        assert_eq!(created, fetched);
        assert_eq!(fetched.status, TaskStatus::Received);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn duplicate_create_fails_and_keeps_original() {
        let store = MemoryTaskStore::new();
        create(&store, "t1");
        let err = store
            .create(id("t1"), "other.xlsx".into(), "/up/other.xlsx".into())
            .unwrap_err();
        assert!(matches!(err, Doc2PdfError::DuplicateTask { .. }));
        assert_eq!(store.get(&id("t1")).unwrap().original_name, "t1.docx");
    }

    #[test]
    fn get_unknown_is_none() {
        let store = MemoryTaskStore::new();
        assert!(store.get(&id("unknown-id")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn transition_unknown_is_not_found() {
        let store = MemoryTaskStore::new();
        let err = store.transition(&id("nope"), Transition::Start).unwrap_err();
        assert!(matches!(err, Doc2PdfError::TaskNotFound { .. }));
    }

    #[test]
    fn transitions_are_visible_to_readers() {
        let store = MemoryTaskStore::new();
        create(&store, "t1");
        store.transition(&id("t1"), Transition::Start).unwrap();
        assert_eq!(store.get(&id("t1")).unwrap().status, TaskStatus::Converting);

        let done = store
            .transition(
                &id("t1"),
                Transition::Complete {
                    output_path: "/out/t1.pdf".into(),
                },
            )
            .unwrap();
        assert_eq!(done, store.get(&id("t1")).unwrap());
        assert_eq!(done.status, TaskStatus::Converted);
    }

    #[test]
    fn rejected_transition_leaves_record_unchanged() {
        let store = MemoryTaskStore::new();
        let before = create(&store, "t1");
        assert!(store
            .transition(&id("t1"), Transition::Fail { detail: "x".into() })
            .is_err());
        assert_eq!(store.get(&id("t1")).unwrap(), before);
    }

    #[test]
    fn remove_returns_record() {
        let store = MemoryTaskStore::new();
        create(&store, "t1");
        assert_eq!(store.remove(&id("t1")).unwrap().id, id("t1"));
        assert!(store.get(&id("t1")).is_none());
        assert!(store.remove(&id("t1")).is_none());
    }

    #[test]
    fn removed_id_cannot_be_created_again() {
        let store = MemoryTaskStore::new();
        create(&store, "t1");
        store.remove(&id("t1")).unwrap();

        let err = store
            .create(id("t1"), "again.docx".into(), "/up/again.docx".into())
            .unwrap_err();
        assert!(matches!(err, Doc2PdfError::DuplicateTask { .. }));
        assert!(store.get(&id("t1")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn removing_unknown_id_does_not_retire_it() {
        let store = MemoryTaskStore::new();
        assert!(store.remove(&id("never")).is_none());
        create(&store, "never");
    }

    #[test]
    fn list_is_oldest_first() {
        let store = MemoryTaskStore::new();
        for s in ["a", "b", "c"] {
            create(&store, s);
        }
        // equal timestamps fall back to id order, which matches creation order here
        let ids: Vec<String> = store.list().into_iter().map(|t| t.id.to_string()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn concurrent_creates_from_threads() {
        let store = Arc::new(MemoryTaskStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for j in 0..25 {
                        store
                            .create(id(&format!("t{i}-{j}")), "x.txt".into(), "/up/x.txt".into())
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 200);
    }
}
