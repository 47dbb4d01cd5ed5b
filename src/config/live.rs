//! Atomically swappable view of the current configuration.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::schema::ServeConfig;

/// Shared handle to the configuration currently in effect.
///
/// Readers take a cheap snapshot per use; the watcher swaps in whole
/// validated configs, so a reader never observes a partial update.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    inner: Arc<ArcSwap<ServeConfig>>,
}

impl LiveConfig {
    pub fn new(config: ServeConfig) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// Snapshot of the current configuration.
    pub fn load(&self) -> Arc<ServeConfig> {
        self.inner.load_full()
    }

    /// Replace the configuration for all readers.
    pub fn store(&self, config: ServeConfig) {
        self.inner.store(Arc::new(config));
    }
}
