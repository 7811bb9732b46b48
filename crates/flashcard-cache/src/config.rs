//! Configuration for [`crate::Cache`].

use crate::events::CacheEvent;
use flashcard_core::events::{EventListeners, FnListener};
use std::path::PathBuf;

/// Configuration for a [`crate::Cache`].
pub struct CacheConfig {
    pub(crate) l1_capacity: usize,
    pub(crate) l1_max_bytes: Option<usize>,
    pub(crate) l2_dir: Option<PathBuf>,
    pub(crate) event_listeners: EventListeners<CacheEvent>,
    pub(crate) name: String,
}

/// Builder for [`CacheConfig`].
pub struct CacheConfigBuilder {
    l1_capacity: usize,
    l1_max_bytes: Option<usize>,
    l2_dir: Option<PathBuf>,
    event_listeners: EventListeners<CacheEvent>,
    name: String,
}

impl Default for CacheConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheConfigBuilder {
    /// Defaults: 1000-entry L1 with no byte budget, no L2 (memory-only).
    pub fn new() -> Self {
        Self {
            l1_capacity: 1000,
            l1_max_bytes: None,
            l2_dir: None,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    pub fn l1_capacity(mut self, capacity: usize) -> Self {
        self.l1_capacity = capacity;
        self
    }

    pub fn l1_max_bytes(mut self, max_bytes: usize) -> Self {
        self.l1_max_bytes = Some(max_bytes);
        self
    }

    /// Enables the L2 on-disk tier, rooted at `dir`. Entries are written as
    /// `<dir>/<hex-fingerprint>.json` via a write-to-temp-then-rename so a
    /// reader never observes a partial file.
    pub fn l2_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.l2_dir = Some(dir.into());
        self
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn on_hit<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, CacheEvent::Hit { .. }) {
                f();
            }
        }));
        self
    }

    pub fn on_miss<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, CacheEvent::Miss { .. }) {
                f();
            }
        }));
        self
    }

    pub fn build(self) -> CacheConfig {
        CacheConfig {
            l1_capacity: self.l1_capacity,
            l1_max_bytes: self.l1_max_bytes,
            l2_dir: self.l2_dir,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}

impl CacheConfig {
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::new()
    }
}
