//! Shared infrastructure for the flashcard pipeline's resilience components.
//!
//! - Event system for observability, reused by every component crate.
//! - The pipeline-wide error taxonomy (see [`ErrorKind`]).

pub mod error;
pub mod events;

pub use error::ErrorKind;
pub use events::{EventListener, EventListeners, FnListener, ResilienceEvent};
