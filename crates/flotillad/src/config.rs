//! Daemon configuration.
//!
//! Orchestration tunables live in an optional TOML file:
//!
//! ```toml
//! converge_timeout_secs = 120
//!
//! [retry]
//! launch_attempts = 3
//! converge_attempts = 3
//! terminate_attempts = 5
//! backoff_base_ms = 500
//! backoff_cap_ms = 30000
//! ```
//!
//! Every field is optional; missing values fall back to the defaults.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use flotilla_lifecycle::RetryPolicy;

/// Orchestration tunables, loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Bounded wait per provisioning task, in seconds.
    pub converge_timeout_secs: u64,
    /// Retry counts and backoff curve for node operations.
    pub retry: RetryPolicy,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            converge_timeout_secs: 120,
            retry: RetryPolicy::default(),
        }
    }
}

impl DaemonConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.converge_timeout_secs)
    }
}
