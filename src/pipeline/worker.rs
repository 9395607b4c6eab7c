//! The single sequential worker.
//!
//! One `drain` task exists at a time: [`super::TaskPipeline::enqueue`] spawns
//! it when the queue goes from idle to armed, and it exits when `pop` finds
//! the queue empty. Each identifier is handled fully, converter call
//! included, before the next is popped, so conversions never overlap and
//! finish in the order they were queued.

use super::Shared;
use crate::converter::ConversionRequest;
use crate::error::ConversionError;
use crate::task::{TaskId, Transition};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub(crate) async fn drain(shared: Arc<Shared>) {
    let guard = RespawnOnPanic(Arc::clone(&shared));
    debug!("Worker started");

    while let Some(id) = shared.queue.pop() {
        process_one(&shared, id).await;
    }
    // The queue is disarmed now; a replacement worker would be a second one.
    drop(guard);

    debug!("Queue drained, worker idle");
    // Outside the queue lock: an observer may enqueue from here.
    if let Some(obs) = &shared.observer {
        obs.on_queue_idle();
    }
}

/// Drive one identifier through `converting` to a terminal state.
///
/// Never returns an error: unknown or stale identifiers are skipped, and
/// conversion failures are recorded on the task.
async fn process_one(shared: &Arc<Shared>, id: TaskId) {
    // Lookup and `received → converting` happen under one store lock, so a
    // duplicate entry for the same id can never start a second conversion.
    let task = match shared.store.transition(&id, Transition::Start) {
        Ok(task) => task,
        Err(e) => {
            warn!("Skipping queued task {}: {}", id, e);
            if let Some(obs) = &shared.observer {
                obs.on_task_skipped(&id, &e.to_string());
            }
            return;
        }
    };

    info!("Converting task {} ('{}')", id, task.original_name);
    let in_flight = FailOnPanic {
        shared: Arc::clone(shared),
        id: id.clone(),
    };
    if let Some(obs) = &shared.observer {
        obs.on_task_started(&id);
    }

    let request = ConversionRequest::new(id.clone(), task.source_path, shared.output_dir.clone());
    let start = Instant::now();

    // Run the converter on its own task so a panic inside it fails this one
    // conversion instead of killing the worker.
    let converter = Arc::clone(&shared.converter);
    let outcome = match tokio::spawn(async move { converter.convert(&request).await }).await {
        Ok(result) => result,
        Err(join_err) => Err(ConversionError::Crashed {
            detail: join_err.to_string(),
        }),
    };
    let elapsed = start.elapsed();

    let transition = match &outcome {
        Ok(path) => Transition::Complete {
            output_path: path.clone(),
        },
        Err(e) => Transition::Fail {
            detail: e.client_message(),
        },
    };

    let recorded = shared.store.transition(&id, transition);
    // The task is terminal (or gone) from here on.
    drop(in_flight);
    if let Err(e) = recorded {
        error!("Task {}: could not record conversion outcome: {}", id, e);
        return;
    }

    match outcome {
        Ok(path) => {
            info!(
                "Task {} converted in {}ms -> {}",
                id,
                elapsed.as_millis(),
                path.display()
            );
            if let Some(obs) = &shared.observer {
                obs.on_task_converted(&id, &path, elapsed);
            }
        }
        Err(e) => {
            warn!("Task {} failed after {}ms: {}", id, elapsed.as_millis(), e);
            if let Some(obs) = &shared.observer {
                obs.on_task_failed(&id, &e);
            }
        }
    }
}

/// Fails the task that was `converting` when the worker panicked, so it
/// cannot stay in a non-terminal state forever.
struct FailOnPanic {
    shared: Arc<Shared>,
    id: TaskId,
}

impl Drop for FailOnPanic {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        let crashed = ConversionError::Crashed {
            detail: "worker panicked during conversion".to_string(),
        };
        error!("Task {}: {}", self.id, crashed);
        let fail = Transition::Fail {
            detail: crashed.client_message(),
        };
        if let Err(e) = self.shared.store.transition(&self.id, fail) {
            error!("Task {}: could not record crash: {}", self.id, e);
        }
    }
}

/// Keeps the queue moving if the worker itself panics (a store or observer
/// bug). The queue is still armed at that point, so a replacement worker is
/// spawned to drain the remaining entries.
struct RespawnOnPanic(Arc<Shared>);

impl Drop for RespawnOnPanic {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("Worker panicked; starting a replacement");
            let shared = Arc::clone(&self.0);
            self.0.runtime.spawn(drain(shared));
        }
    }
}
