//! A resilient concurrent execution core for a two-stage vocabulary
//! flashcard pipeline: fans a batch of terms out through rate limiting,
//! circuit breaking, retry, and a two-tier cache, in bounded concurrency,
//! and re-assembles results in input order.
//!
//! [`orchestrator::Orchestrator`] is the entry point; [`executor::TwoStageExecutor`]
//! is what it drives per entry.

pub mod collector;
pub mod data;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod interfaces;
pub mod observability;
pub mod orchestrator;

pub use data::{Artifact, BatchProgress, EntryOutcome, Fingerprint, Stage1Output, VocabularyEntry};
pub use error::PipelineError;
pub use executor::{TwoStageExecutor, TwoStageExecutorConfig, TwoStageExecutorConfigBuilder};
pub use interfaces::{
    InMemoryTaskStore, Invoke, InvokeOptions, InvokeResponse, ProgressDelta, TaskRow, TaskStatus, TaskStore,
};
pub use orchestrator::{CancelToken, Orchestrator, PipelineConfig, PipelineConfigBuilder};
