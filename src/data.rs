//! The batch's data model: entries in, artifacts and progress out.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// An immutable item in the input batch. `position` is unique within a batch
/// and is the sort key the [`crate::collector::OrderedCollector`] emits by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub position: u32,
    pub term: String,
    pub kind: String,
}

/// A 256-bit content hash over (term, kind, stage, model id, prompt version),
/// and for stage 2, the canonical serialization of the stage-1 output.
/// Equality defines cache identity; stable across process restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub(crate) fn from_hex(hex: String) -> Self {
        debug_assert_eq!(hex.len(), 64, "fingerprint must be 64 lowercase hex chars");
        Self(hex)
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw output of a single stage-1 invocation, cached independently of stage 2
/// so a stage-2 miss after a stage-1 hit doesn't repeat the first call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage1Output {
    pub text: String,
    pub token_usage: u32,
}

/// Stage 2 output plus provenance. Write-once: once written for a
/// fingerprint it is never mutated. `from_cache` reflects whether *this*
/// access recomputed anything, not what was true when the value was first
/// written, so it is overwritten by the caller on every read rather than
/// trusted from the stored value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub fingerprint: String,
    pub created_at_unix_ms: u64,
    pub token_usage: u32,
    pub from_cache: bool,
    pub text: String,
}

/// Monotonic counters for one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProgress {
    pub batch_id: String,
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub from_cache: u32,
    pub started_at_unix_ms: u64,
    pub ended_at_unix_ms: Option<u64>,
}

impl BatchProgress {
    pub(crate) fn new(batch_id: String, total: u32, started_at_unix_ms: u64) -> Self {
        Self {
            batch_id,
            total,
            completed: 0,
            failed: 0,
            from_cache: 0,
            started_at_unix_ms,
            ended_at_unix_ms: None,
        }
    }
}

/// Either a completed artifact or a per-entry failure, tagged with the
/// position it belongs to. What the sink receives, and what `TaskStore`
/// checkpoints describe.
#[derive(Debug, Clone)]
pub enum EntryOutcome {
    Completed(Artifact),
    Failed { error: crate::PipelineError },
}

pub(crate) fn unix_ms_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}
