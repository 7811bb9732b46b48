//! Runs a small vocabulary batch end to end against a fake model.
//!
//! Composes: rate limiter -> circuit breaker -> retry -> two-tier cache
//! around a fake `Invoke`, driven by the orchestrator's bounded worker pool,
//! with results re-assembled in input order.
//!
//! Run with: cargo run --example run_batch

use flashcard_cache::{Cache, CacheConfig};
use flashcard_circuitbreaker::{CircuitBreaker, CircuitBreakerConfig};
use flashcard_pipeline::{
    CancelToken, EntryOutcome, InMemoryTaskStore, Invoke, InvokeOptions, InvokeResponse, Orchestrator, PipelineConfig,
    PipelineError, TwoStageExecutor, TwoStageExecutorConfig, VocabularyEntry,
};
use flashcard_ratelimiter::{RateLimiter, RateLimiterConfig};
use flashcard_retry::RetryConfigBuilder;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A fake model that occasionally returns a transient 5xx, so the demo
/// exercises the retry path rather than only the happy path.
struct FlakyModel {
    calls: AtomicUsize,
}

impl Invoke for FlakyModel {
    fn invoke<'a>(
        &'a self,
        prompt: &'a str,
        _options: &'a InvokeOptions,
    ) -> BoxFuture<'a, Result<InvokeResponse, PipelineError>> {
        Box::pin(async move {
            let call_num = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call_num % 7 == 0 {
                return Err(PipelineError::Server5xx(503));
            }
            Ok(InvokeResponse {
                text: format!("generated: {prompt}"),
                token_usage: 12,
            })
        })
    }
}

#[tokio::main]
async fn main() {
    let invoke: Arc<dyn Invoke> = Arc::new(FlakyModel { calls: AtomicUsize::new(0) });

    let rate_limiter = Arc::new(RateLimiter::new(
        RateLimiterConfig::builder().rate(50, Duration::from_secs(1)).burst(10).build(),
    ));
    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::builder().build()));
    let stage1_cache = Arc::new(Cache::new(CacheConfig::builder().l1_capacity(256).build()));
    let stage2_cache = Arc::new(Cache::new(CacheConfig::builder().l1_capacity(256).build()));
    let retry_config = RetryConfigBuilder::new()
        .max_attempts(3)
        .initial_delay(Duration::from_millis(10))
        .retry_on(|e: &PipelineError| e.is_transient())
        .build();

    let executor = Arc::new(TwoStageExecutor::new(
        TwoStageExecutorConfig::builder().model_id("demo-model").build(),
        rate_limiter,
        breaker,
        stage1_cache,
        stage2_cache,
        retry_config,
        invoke,
    ));

    let task_store = Arc::new(InMemoryTaskStore::new());
    let orchestrator = Orchestrator::new(executor, task_store, PipelineConfig::builder().concurrency(4).build());

    let entries: Vec<VocabularyEntry> = ["apple", "run", "quickly", "serendipity", "table", "ubiquitous"]
        .iter()
        .enumerate()
        .map(|(i, term)| VocabularyEntry {
            position: i as u32 + 1,
            term: term.to_string(),
            kind: "noun".to_string(),
        })
        .collect();

    let progress = orchestrator
        .run(
            "demo-batch",
            entries,
            |position, outcome| match outcome {
                EntryOutcome::Completed(artifact) => {
                    println!("[{position}] ok (from_cache={}): {}", artifact.from_cache, artifact.text);
                }
                EntryOutcome::Failed { error } => {
                    println!("[{position}] failed: {error}");
                }
            },
            CancelToken::new(),
        )
        .await;

    println!(
        "batch {} done: {}/{} completed, {} failed, {} from cache",
        progress.batch_id, progress.completed, progress.total, progress.failed, progress.from_cache
    );
}
