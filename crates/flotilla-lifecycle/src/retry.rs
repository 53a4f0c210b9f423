//! Retry and backoff tunables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded-retry-with-backoff policy for provisioning operations.
///
/// Counts and curve are deliberately configuration, not constants; the
/// daemon can override them from its TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Launch attempts before surfacing `ProvisioningFailed`.
    pub launch_attempts: u32,
    /// Converge attempts before surfacing `ConvergeFailed`.
    pub converge_attempts: u32,
    /// Terminate attempts before giving the operator the error.
    /// Higher than the others: leaked infrastructure is the costlier
    /// failure mode.
    pub terminate_attempts: u32,
    /// First backoff delay in milliseconds; doubles per attempt.
    pub backoff_base_ms: u64,
    /// Backoff ceiling in milliseconds.
    pub backoff_cap_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            launch_attempts: 3,
            converge_attempts: 3,
            terminate_attempts: 5,
            backoff_base_ms: 500,
            backoff_cap_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before re-attempting after `attempt` failures (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ms = self
            .backoff_base_ms
            .saturating_mul(1u64 << exp)
            .min(self.backoff_cap_ms);
        Duration::from_millis(ms)
    }

    /// A policy with near-zero delays, for tests.
    pub fn immediate() -> Self {
        Self {
            backoff_base_ms: 1,
            backoff_cap_ms: 1,
            ..Self::default()
        }
    }
}
