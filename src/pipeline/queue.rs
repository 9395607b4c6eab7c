//! FIFO of task identifiers plus the "worker armed" flag.
//!
//! Both live under one mutex so that "queue is empty, go idle" and "append,
//! arm the worker if idle" can never interleave: an append either lands
//! before the worker's final `pop` (and is drained by it) or after the worker
//! went idle (and arms a new one). Nothing is ever stranded.

use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

/// Snapshot of the queue, read under the queue lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    /// Identifiers waiting behind the one being converted.
    pub pending_count: usize,
    /// Whether the worker loop is running.
    pub is_processing: bool,
}

/// Result of [`WorkQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Push {
    /// Appended while the worker was idle; the caller must start it.
    Armed { pending: usize },
    /// Appended behind a running worker.
    Appended { pending: usize },
    /// The identifier is already waiting; nothing changed.
    Duplicate,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<TaskId>,
    processing: bool,
}

#[derive(Debug, Default)]
pub(crate) struct WorkQueue {
    state: Mutex<QueueState>,
    idle: Notify,
}

impl WorkQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, id: TaskId) -> Push {
        let mut state = self.lock();
        if state.pending.contains(&id) {
            return Push::Duplicate;
        }
        state.pending.push_back(id);
        let pending = state.pending.len();
        if state.processing {
            Push::Appended { pending }
        } else {
            state.processing = true;
            Push::Armed { pending }
        }
    }

    /// Take the head of the queue. On `None` the worker is disarmed before
    /// the lock is released, and idle waiters are woken.
    pub(crate) fn pop(&self) -> Option<TaskId> {
        let mut state = self.lock();
        match state.pending.pop_front() {
            Some(id) => Some(id),
            None => {
                state.processing = false;
                drop(state);
                self.idle.notify_waiters();
                None
            }
        }
    }

    pub(crate) fn status(&self) -> QueueStatus {
        let state = self.lock();
        QueueStatus {
            pending_count: state.pending.len(),
            is_processing: state.processing,
        }
    }

    fn is_idle(&self) -> bool {
        let state = self.lock();
        !state.processing && state.pending.is_empty()
    }

    /// Resolve once the queue is empty and the worker is idle.
    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a wake-up between the check and the
            // await is not lost.
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    // Critical sections are single VecDeque/bool operations; a poisoned lock
    // still holds a consistent state.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
