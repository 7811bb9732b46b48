//! External collaborators the core consumes: the remote model call and the
//! checkpoint store. Both are traits rather than concrete types so tests and
//! the demo can swap in fakes, following the teacher's
//! `Arc<dyn Fn(Req) -> BoxFuture<'static, Result<Res, E>> + Send + Sync>`
//! pattern for dyn-safe async collaborators (`tower-resilience-fallback`'s
//! `ServiceFn`).

use crate::error::PipelineError;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Mutex;

/// Options threaded through to a single `invoke` call.
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    pub model_id: String,
    pub prompt_version: String,
}

/// The remote model's response to one prompt.
#[derive(Debug, Clone)]
pub struct InvokeResponse {
    pub text: String,
    pub token_usage: u32,
}

/// The opaque remote-model call: `invoke(prompt) -> text | error`. Implemented
/// once against the real model API; tests and the demo implement it against a
/// fake.
pub trait Invoke: Send + Sync {
    fn invoke<'a>(
        &'a self,
        prompt: &'a str,
        options: &'a InvokeOptions,
    ) -> BoxFuture<'a, Result<InvokeResponse, PipelineError>>;
}

/// Status of one entry's checkpoint row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

/// One row of the external checkpoint store, keyed by `(batch_id, position)`.
#[derive(Debug, Clone)]
pub struct TaskRow {
    pub batch_id: String,
    pub position: u32,
    pub status: TaskStatus,
    pub attempt: u16,
    pub error_kind: Option<String>,
    pub updated_at_unix_ms: u64,
}

/// Delta applied atomically to a batch's progress counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressDelta {
    pub completed: u32,
    pub failed: u32,
    pub from_cache: u32,
}

/// Checkpoint store the orchestrator writes through before and after running
/// each entry, so a crashed batch can resume: only non-`completed` rows are
/// re-enqueued. Each call is a single-statement transaction on the store's
/// own state, mirroring `flashcard_circuitbreaker::store::BreakerStore`'s
/// synchronous, opaque persistence contract.
pub trait TaskStore: Send + Sync {
    fn upsert_task(
        &self,
        batch_id: &str,
        position: u32,
        status: TaskStatus,
        attempt: u16,
        error_kind: Option<String>,
    );

    fn load_batch(&self, batch_id: &str) -> Vec<TaskRow>;

    fn update_progress(&self, batch_id: &str, delta: ProgressDelta);
}

/// In-memory `TaskStore`, the default for tests and the demo. A real
/// deployment would back this with a database; this project treats database
/// schema migrations as out of scope (spec §1), same as the teacher's
/// `InMemoryBreakerStore` default for `BreakerStore`.
#[derive(Default)]
pub struct InMemoryTaskStore {
    rows: Mutex<HashMap<(String, u32), TaskRow>>,
    progress: Mutex<HashMap<String, ProgressDelta>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for InMemoryTaskStore {
    fn upsert_task(
        &self,
        batch_id: &str,
        position: u32,
        status: TaskStatus,
        attempt: u16,
        error_kind: Option<String>,
    ) {
        self.rows.lock().unwrap().insert(
            (batch_id.to_string(), position),
            TaskRow {
                batch_id: batch_id.to_string(),
                position,
                status,
                attempt,
                error_kind,
                updated_at_unix_ms: crate::data::unix_ms_now(),
            },
        );
    }

    fn load_batch(&self, batch_id: &str) -> Vec<TaskRow> {
        let mut rows: Vec<TaskRow> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|row| row.batch_id == batch_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.position);
        rows
    }

    fn update_progress(&self, batch_id: &str, delta: ProgressDelta) {
        let mut progress = self.progress.lock().unwrap();
        let entry = progress.entry(batch_id.to_string()).or_default();
        entry.completed += delta.completed;
        entry.failed += delta.failed;
        entry.from_cache += delta.from_cache;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_batch_returns_rows_in_position_order() {
        let store = InMemoryTaskStore::new();
        store.upsert_task("b1", 3, TaskStatus::Pending, 0, None);
        store.upsert_task("b1", 1, TaskStatus::Pending, 0, None);
        store.upsert_task("b1", 2, TaskStatus::Pending, 0, None);
        store.upsert_task("b2", 1, TaskStatus::Pending, 0, None);

        let rows = store.load_batch("b1");
        let positions: Vec<u32> = rows.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[test]
    fn upsert_overwrites_the_same_position() {
        let store = InMemoryTaskStore::new();
        store.upsert_task("b1", 1, TaskStatus::Pending, 0, None);
        store.upsert_task("b1", 1, TaskStatus::Completed, 1, None);

        let rows = store.load_batch("b1");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, TaskStatus::Completed);
    }
}
