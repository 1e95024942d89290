//! Runtime Configuration
//!
//! A small set of knobs that affect diagnostics and scheduling. The core
//! runs on a single logical thread, so the active configuration is kept per
//! thread and read wherever it is needed.

use std::cell::RefCell;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

thread_local! {
    static CURRENT: RefCell<RuntimeConfig> = RefCell::new(RuntimeConfig::default());
}

/// Tunables for the reactive runtime.
///
/// Missing fields fall back to their defaults when deserializing.
///
/// ```rust,ignore
/// let config = RuntimeConfig::from_json_str(r#"{ "cleanup_warn_threshold": 200 }"#)?;
/// config.install();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of live cleanups on a single lifetime token above which a
    /// leak warning is logged.
    pub cleanup_warn_threshold: usize,

    /// Period of `animation_loop` callbacks, in milliseconds.
    pub frame_interval_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cleanup_warn_threshold: 500,
            frame_interval_ms: 16,
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the runtime misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cleanup_warn_threshold == 0 {
            return Err(ConfigError::Invalid {
                field: "cleanup_warn_threshold",
            });
        }
        if self.frame_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "frame_interval_ms",
            });
        }
        Ok(())
    }

    /// Frame period as a `Duration`.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    /// Make this the active configuration for the current thread.
    pub fn install(self) {
        CURRENT.with(|current| *current.borrow_mut() = self);
    }

    /// The active configuration for the current thread.
    pub fn current() -> Self {
        CURRENT.with(|current| current.borrow().clone())
    }
}
