//! Two-stage request executor (§4.E): composes the rate limiter, circuit
//! breaker, retry executor, and cache around a single [`VocabularyEntry`].
//!
//! `CircuitOpen` and parse errors are non-retryable; network/5xx/timeout
//! errors are retried per `retry_config`. A stage-1 cache hit with a stage-2
//! miss is the hot path for retries and checkpoint resume.

use crate::data::{Artifact, Fingerprint, Stage1Output, VocabularyEntry};
use crate::error::{self, PipelineError};
use crate::fingerprint;
use crate::interfaces::{Invoke, InvokeOptions, InvokeResponse};
use flashcard_cache::Cache;
use flashcard_circuitbreaker::CircuitBreaker;
use flashcard_ratelimiter::RateLimiter;
use flashcard_retry::{retry, RetryConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Configuration for a [`TwoStageExecutor`].
pub struct TwoStageExecutorConfig {
    pub model_id: String,
    pub prompt_version: String,
    /// Rate-limiter/circuit-breaker service key both stages share; the spec
    /// composes both stages through the same remote dependency (`"model"`).
    pub service_name: String,
    pub stage1_acquire_timeout: Option<Duration>,
    pub stage2_acquire_timeout: Option<Duration>,
}

/// Builder for [`TwoStageExecutorConfig`].
pub struct TwoStageExecutorConfigBuilder {
    model_id: String,
    prompt_version: String,
    service_name: String,
    stage1_acquire_timeout: Option<Duration>,
    stage2_acquire_timeout: Option<Duration>,
}

impl TwoStageExecutorConfigBuilder {
    pub fn new() -> Self {
        Self {
            model_id: "default-model".to_string(),
            prompt_version: "v1".to_string(),
            service_name: "model".to_string(),
            stage1_acquire_timeout: None,
            stage2_acquire_timeout: None,
        }
    }

    pub fn model_id<S: Into<String>>(mut self, model_id: S) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn prompt_version<S: Into<String>>(mut self, prompt_version: S) -> Self {
        self.prompt_version = prompt_version.into();
        self
    }

    pub fn service_name<S: Into<String>>(mut self, service_name: S) -> Self {
        self.service_name = service_name.into();
        self
    }

    pub fn stage1_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.stage1_acquire_timeout = Some(timeout);
        self
    }

    pub fn stage2_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.stage2_acquire_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> TwoStageExecutorConfig {
        TwoStageExecutorConfig {
            model_id: self.model_id,
            prompt_version: self.prompt_version,
            service_name: self.service_name,
            stage1_acquire_timeout: self.stage1_acquire_timeout,
            stage2_acquire_timeout: self.stage2_acquire_timeout,
        }
    }
}

impl Default for TwoStageExecutorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TwoStageExecutorConfig {
    pub fn builder() -> TwoStageExecutorConfigBuilder {
        TwoStageExecutorConfigBuilder::new()
    }
}

/// Composes rate limiter + circuit breaker + retry + cache around
/// `stage1(entry)` then `stage2(entry, stage1_output)` for one entry.
///
/// The `retry_config` passed to [`TwoStageExecutor::new`] should set
/// `retry_on(|e| e.is_transient())` — per §7's propagation policy, only
/// Transient errors are retryable; Terminal-remote and Safety errors must
/// bypass the retry loop. The executor composes retry as a reusable
/// component rather than hard-coding the predicate, matching §4.C's
/// `retry_on: predicate(Error) -> bool` contract.
pub struct TwoStageExecutor {
    config: TwoStageExecutorConfig,
    rate_limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    stage1_cache: Arc<Cache<Fingerprint, Stage1Output, PipelineError>>,
    stage2_cache: Arc<Cache<Fingerprint, Artifact, PipelineError>>,
    retry_config: RetryConfig<PipelineError>,
    invoke: Arc<dyn Invoke>,
}

impl TwoStageExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: TwoStageExecutorConfig,
        rate_limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreaker>,
        stage1_cache: Arc<Cache<Fingerprint, Stage1Output, PipelineError>>,
        stage2_cache: Arc<Cache<Fingerprint, Artifact, PipelineError>>,
        retry_config: RetryConfig<PipelineError>,
        invoke: Arc<dyn Invoke>,
    ) -> Self {
        Self {
            config,
            rate_limiter,
            breaker,
            stage1_cache,
            stage2_cache,
            retry_config,
            invoke,
        }
    }

    /// Runs both stages for `entry`, returning the final artifact.
    ///
    /// `from_cache` on the returned artifact reflects whether *this* call
    /// recomputed anything: it's `true` only if neither stage's `compute`
    /// closure ran, which also makes a coalesced wait on someone else's
    /// in-flight computation read as "not from cache" — a deliberately loose
    /// provenance signal, consistent with §4.H's "snapshots are consistent
    /// per component but not globally atomic".
    pub async fn execute_entry(&self, entry: &VocabularyEntry) -> Result<Artifact, PipelineError> {
        let any_computed = AtomicBool::new(false);

        let fp1 = fingerprint::stage1(entry, &self.config.model_id, &self.config.prompt_version);
        let stage1_output = self
            .stage1_cache
            .get_or_compute(fp1, || async {
                any_computed.store(true, Ordering::SeqCst);
                let prompt = prompt1(entry);
                let response = self
                    .call_through(self.config.stage1_acquire_timeout, &prompt)
                    .await?;
                parse_stage1(response)
            })
            .await
            .map_err(error::from_cache)?;

        let fp2 = fingerprint::stage2(entry, &self.config.model_id, &self.config.prompt_version, &stage1_output);
        let fp2_hex = fp2.as_hex().to_string();
        let mut artifact = self
            .stage2_cache
            .get_or_compute(fp2, || async {
                any_computed.store(true, Ordering::SeqCst);
                let prompt = prompt2(entry, &stage1_output);
                let response = self
                    .call_through(self.config.stage2_acquire_timeout, &prompt)
                    .await?;
                parse_stage2(&fp2_hex, response)
            })
            .await
            .map_err(error::from_cache)?;

        artifact.from_cache = !any_computed.load(Ordering::SeqCst);
        Ok(artifact)
    }

    /// Rate-limit acquire, then circuit-breaker-gated retry, around one
    /// `invoke` call. Shared by both stages since both go through the same
    /// remote dependency.
    async fn call_through(&self, acquire_timeout: Option<Duration>, prompt: &str) -> Result<InvokeResponse, PipelineError> {
        let deadline = acquire_timeout.map(|timeout| Instant::now() + timeout);
        self.rate_limiter
            .acquire(Some(self.config.service_name.as_str()), 1, deadline)
            .await
            .map_err(error::from_rate_limiter)?;

        let options = InvokeOptions {
            model_id: self.config.model_id.clone(),
            prompt_version: self.config.prompt_version.clone(),
        };

        self.breaker
            .call(&self.config.service_name, || async {
                retry(&self.retry_config, || self.invoke.invoke(prompt, &options))
                    .await
                    .map_err(error::from_retry_exhausted)
            })
            .await
            .map_err(error::from_circuit_breaker)
    }
}

fn prompt1(entry: &VocabularyEntry) -> String {
    format!("Define the {} term \"{}\".", entry.kind, entry.term)
}

fn prompt2(entry: &VocabularyEntry, stage1: &Stage1Output) -> String {
    format!(
        "Given the definition \"{}\" for the {} term \"{}\", produce the final flashcard.",
        stage1.text, entry.kind, entry.term
    )
}

fn parse_stage1(response: InvokeResponse) -> Result<Stage1Output, PipelineError> {
    if response.text.trim().is_empty() {
        return Err(PipelineError::Parse("stage 1 response was empty".to_string()));
    }
    Ok(Stage1Output {
        text: response.text,
        token_usage: response.token_usage,
    })
}

fn parse_stage2(fingerprint_hex: &str, response: InvokeResponse) -> Result<Artifact, PipelineError> {
    if response.text.trim().is_empty() {
        return Err(PipelineError::Parse("stage 2 response was empty".to_string()));
    }
    Ok(Artifact {
        fingerprint: fingerprint_hex.to_string(),
        created_at_unix_ms: crate::data::unix_ms_now(),
        token_usage: response.token_usage,
        from_cache: false,
        text: response.text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashcard_cache::CacheConfig;
    use flashcard_circuitbreaker::CircuitBreakerConfig;
    use flashcard_ratelimiter::RateLimiterConfig;
    use flashcard_retry::RetryConfigBuilder;
    use futures::future::BoxFuture;
    use std::sync::atomic::AtomicUsize;

    struct CountingInvoke {
        calls: AtomicUsize,
        fail_first: usize,
    }

    impl Invoke for CountingInvoke {
        fn invoke<'a>(
            &'a self,
            prompt: &'a str,
            _options: &'a InvokeOptions,
        ) -> BoxFuture<'a, Result<InvokeResponse, PipelineError>> {
            Box::pin(async move {
                let call_num = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                if call_num <= self.fail_first {
                    return Err(PipelineError::Server5xx(503));
                }
                Ok(InvokeResponse {
                    text: format!("response to: {prompt}"),
                    token_usage: 10,
                })
            })
        }
    }

    fn entry() -> VocabularyEntry {
        VocabularyEntry {
            position: 1,
            term: "안녕".to_string(),
            kind: "interjection".to_string(),
        }
    }

    fn executor(invoke: Arc<dyn Invoke>) -> TwoStageExecutor {
        TwoStageExecutor::new(
            TwoStageExecutorConfig::builder().build(),
            Arc::new(flashcard_ratelimiter::RateLimiter::new(
                RateLimiterConfig::builder().rate(1000, Duration::from_secs(1)).burst(100).build(),
            )),
            Arc::new(flashcard_circuitbreaker::CircuitBreaker::new(CircuitBreakerConfig::builder().build())),
            Arc::new(Cache::new(CacheConfig::builder().build())),
            Arc::new(Cache::new(CacheConfig::builder().build())),
            RetryConfigBuilder::new()
                .max_attempts(3)
                .initial_delay(Duration::from_millis(1))
                .retry_on(|e: &PipelineError| e.is_transient())
                .build(),
            invoke,
        )
    }

    #[tokio::test]
    async fn executes_both_stages_and_produces_an_artifact() {
        let invoke = Arc::new(CountingInvoke {
            calls: AtomicUsize::new(0),
            fail_first: 0,
        });
        let executor = executor(invoke.clone());

        let artifact = executor.execute_entry(&entry()).await.unwrap();
        assert!(!artifact.from_cache);
        assert_eq!(invoke.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_run_with_same_entry_hits_cache_and_skips_invoke() {
        let invoke = Arc::new(CountingInvoke {
            calls: AtomicUsize::new(0),
            fail_first: 0,
        });
        let executor = executor(invoke.clone());

        executor.execute_entry(&entry()).await.unwrap();
        let artifact = executor.execute_entry(&entry()).await.unwrap();

        assert!(artifact.from_cache);
        assert_eq!(invoke.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_then_succeed() {
        let invoke = Arc::new(CountingInvoke {
            calls: AtomicUsize::new(0),
            fail_first: 1,
        });
        let executor = executor(invoke.clone());

        let artifact = executor.execute_entry(&entry()).await.unwrap();
        assert!(!artifact.from_cache);
        assert_eq!(invoke.calls.load(Ordering::SeqCst), 3);
    }
}
