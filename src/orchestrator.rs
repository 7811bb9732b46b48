//! Orchestrator (§4.G): drives a batch through the two-stage executor with
//! bounded concurrency, checkpointing, cancellation, and per-entry timeouts.

use crate::collector::OrderedCollector;
use crate::data::{unix_ms_now, BatchProgress, EntryOutcome, VocabularyEntry};
use crate::error::PipelineError;
use crate::executor::TwoStageExecutor;
use crate::interfaces::{ProgressDelta, TaskStatus, TaskStore};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative cancellation signal, checked by workers between entries.
///
/// Entries already in flight when cancellation fires run to completion —
/// the component crates composed by [`TwoStageExecutor`] (rate limiter,
/// cache, retry) don't thread a cancellation token through their own
/// suspension points in this implementation, so cancellation here is
/// between-entry rather than mid-call. Cheap to clone; shares one flag.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Configuration for an [`Orchestrator`] run.
pub struct PipelineConfig {
    /// `C`: worker pool size, and the cap on total in-flight entries.
    pub concurrency: usize,
    /// `D_entry`: per-entry deadline; exceeding it yields `failed{timeout}`
    /// without cancelling sibling entries.
    pub entry_timeout: Option<Duration>,
    /// Bound on the ordered collector's output channel.
    pub collector_capacity: usize,
}

/// Builder for [`PipelineConfig`].
pub struct PipelineConfigBuilder {
    concurrency: usize,
    entry_timeout: Option<Duration>,
    collector_capacity: usize,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self {
            concurrency: 4,
            entry_timeout: None,
            collector_capacity: 64,
        }
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn entry_timeout(mut self, timeout: Duration) -> Self {
        self.entry_timeout = Some(timeout);
        self
    }

    pub fn collector_capacity(mut self, capacity: usize) -> Self {
        self.collector_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> PipelineConfig {
        PipelineConfig {
            concurrency: self.concurrency,
            entry_timeout: self.entry_timeout,
            collector_capacity: self.collector_capacity,
        }
    }
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }
}

#[derive(Default)]
struct Counters {
    completed: AtomicU32,
    failed: AtomicU32,
    from_cache: AtomicU32,
}

/// Drives a batch of [`VocabularyEntry`] values through a [`TwoStageExecutor`]
/// with a bounded worker pool, checkpointing through a [`TaskStore`], and a
/// single drainer task preserving position order into the caller's `sink`.
pub struct Orchestrator {
    executor: Arc<TwoStageExecutor>,
    task_store: Arc<dyn TaskStore>,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(executor: Arc<TwoStageExecutor>, task_store: Arc<dyn TaskStore>, config: PipelineConfig) -> Self {
        Self {
            executor,
            task_store,
            config,
        }
    }

    /// Runs `entries` under `batch_id`, calling `sink(position, outcome)` for
    /// each entry not already `completed` in the task store, in strictly
    /// increasing position order. Resuming a batch whose earlier positions
    /// already completed does not re-emit them to `sink` — a caller wanting
    /// those re-surfaced from cache can re-run with a fresh `batch_id`.
    pub async fn run<S>(&self, batch_id: &str, entries: Vec<VocabularyEntry>, sink: S, cancel: CancelToken) -> BatchProgress
    where
        S: Fn(u32, EntryOutcome) + Send + Sync + 'static,
    {
        let total = entries.len() as u32;
        let started_at = unix_ms_now();

        let already_completed: std::collections::HashSet<u32> = self
            .task_store
            .load_batch(batch_id)
            .into_iter()
            .filter(|row| row.status == TaskStatus::Completed)
            .map(|row| row.position)
            .collect();

        let to_run: Vec<VocabularyEntry> = entries
            .into_iter()
            .filter(|e| !already_completed.contains(&e.position))
            .collect();

        let resume_cursor = (1..=total).find(|p| !already_completed.contains(p)).unwrap_or(total + 1);

        let (collector, mut rx) = OrderedCollector::resuming_from(self.config.collector_capacity, resume_cursor);
        let collector = Arc::new(collector);
        collector.set_expected(to_run.len() as u32);

        let counters = Arc::new(Counters::default());

        let drainer = {
            let counters = counters.clone();
            tokio::spawn(async move {
                // Drains until the channel closes rather than counting up to
                // `to_run.len()`: on cancellation the feeder stops enqueuing
                // before every entry in `to_run` is ever dequeued, so that
                // count is never reached and the channel closing is the only
                // reliable end-of-batch signal.
                while let Some((position, outcome)) = rx.recv().await {
                    match &outcome {
                        EntryOutcome::Completed(artifact) => {
                            counters.completed.fetch_add(1, Ordering::SeqCst);
                            if artifact.from_cache {
                                counters.from_cache.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                        EntryOutcome::Failed { .. } => {
                            counters.failed.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                    sink(position, outcome);
                }
            })
        };

        let (tx, work_rx) = tokio::sync::mpsc::channel::<VocabularyEntry>(self.config.concurrency);
        let work_rx = Arc::new(tokio::sync::Mutex::new(work_rx));

        let feeder = {
            let cancel = cancel.clone();
            let to_run = to_run.clone();
            tokio::spawn(async move {
                for entry in to_run {
                    if cancel.is_cancelled() {
                        break;
                    }
                    if tx.send(entry).await.is_err() {
                        break;
                    }
                }
            })
        };

        let mut workers = Vec::with_capacity(self.config.concurrency);
        for _ in 0..self.config.concurrency {
            let executor = self.executor.clone();
            let task_store = self.task_store.clone();
            let collector = collector.clone();
            let work_rx = work_rx.clone();
            let cancel = cancel.clone();
            let entry_timeout = self.config.entry_timeout;
            let batch_id = batch_id.to_string();

            workers.push(tokio::spawn(async move {
                loop {
                    let entry = {
                        let mut rx = work_rx.lock().await;
                        rx.recv().await
                    };
                    let Some(entry) = entry else { break };

                    if cancel.is_cancelled() {
                        task_store.upsert_task(&batch_id, entry.position, TaskStatus::Cancelled, 0, None);
                        task_store.update_progress(&batch_id, ProgressDelta { failed: 1, ..Default::default() });
                        collector
                            .submit(entry.position, EntryOutcome::Failed { error: PipelineError::Cancelled })
                            .await;
                        continue;
                    }

                    task_store.upsert_task(&batch_id, entry.position, TaskStatus::Processing, 1, None);

                    let outcome = run_one_entry(&executor, &entry, entry_timeout).await;

                    match &outcome {
                        EntryOutcome::Completed(artifact) => {
                            task_store.upsert_task(&batch_id, entry.position, TaskStatus::Completed, 1, None);
                            task_store.update_progress(
                                &batch_id,
                                ProgressDelta {
                                    completed: 1,
                                    from_cache: artifact.from_cache as u32,
                                    ..Default::default()
                                },
                            );
                        }
                        EntryOutcome::Failed { error } => {
                            task_store.upsert_task(
                                &batch_id,
                                entry.position,
                                TaskStatus::Failed,
                                1,
                                Some(format!("{error:?}")),
                            );
                            task_store.update_progress(&batch_id, ProgressDelta { failed: 1, ..Default::default() });
                        }
                    }

                    collector.submit(entry.position, outcome).await;
                }
            }));
        }

        let _ = feeder.await;
        for worker in workers {
            let _ = worker.await;
        }
        // Every worker held a clone of `collector`, the sole owner of the
        // channel's `Sender`. Dropping it here — after all workers have
        // exited and before awaiting the drainer — closes the channel so
        // `rx.recv()` returns `None` and the drainer actually finishes
        // instead of waiting forever for a count that cancellation can
        // leave unreachable.
        drop(collector);
        let _ = drainer.await;

        let mut progress = BatchProgress::new(batch_id.to_string(), total, started_at);
        progress.completed = already_completed.len() as u32 + counters.completed.load(Ordering::SeqCst);
        progress.failed = counters.failed.load(Ordering::SeqCst);
        progress.from_cache = counters.from_cache.load(Ordering::SeqCst);
        progress.ended_at_unix_ms = Some(unix_ms_now());
        progress
    }
}

async fn run_one_entry(
    executor: &TwoStageExecutor,
    entry: &VocabularyEntry,
    entry_timeout: Option<Duration>,
) -> EntryOutcome {
    let result = match entry_timeout {
        Some(timeout) => match tokio::time::timeout(timeout, executor.execute_entry(entry)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(PipelineError::EntryTimeout(timeout)),
        },
        None => executor.execute_entry(entry).await,
    };

    match result {
        Ok(artifact) => EntryOutcome::Completed(artifact),
        Err(error) => EntryOutcome::Failed { error },
    }
}
