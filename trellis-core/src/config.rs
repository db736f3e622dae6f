//! Runtime Configuration
//!
//! A small process-wide configuration read by the scheduler and the
//! interception layer. It can be built in code or loaded from JSON; missing
//! fields fall back to their defaults.

use std::sync::OnceLock;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on drain passes in a single `flush_jobs` call. Jobs that
    /// keep re-queueing each other past this bound are dropped.
    pub max_flush_passes: usize,

    /// Emit a warning whenever a write hits a read-only wrapper.
    pub warn_on_readonly_write: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_passes: 100,
            warn_on_readonly_write: true,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration document.
    pub fn from_json_str(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }
}

static CONFIG: OnceLock<RwLock<RuntimeConfig>> = OnceLock::new();

fn get_config() -> &'static RwLock<RuntimeConfig> {
    CONFIG.get_or_init(|| RwLock::new(RuntimeConfig::default()))
}

/// Install a new process-wide configuration.
pub fn configure(config: RuntimeConfig) {
    tracing::debug!(?config, "runtime configured");
    *get_config().write() = config;
}

/// Snapshot of the current configuration.
pub fn config() -> RuntimeConfig {
    get_config().read().clone()
}
