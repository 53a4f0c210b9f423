//! Task executor error types.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for task operations.
pub type TaskResult<T> = Result<T, TaskError>;

/// Errors surfaced when waiting on a submitted task.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The bounded wait elapsed. The remote operation is assumed to
    /// eventually self-terminate; a best-effort abort was forwarded.
    #[error("task {name} timed out after {timeout:?}")]
    Timeout { name: &'static str, timeout: Duration },

    /// The provisioning operation reported a failure.
    #[error("task {name} failed: {message}")]
    Failed { name: &'static str, message: String },

    /// Remote convergence exited non-zero.
    #[error("task {name} exited with status {code}")]
    RemoteExit {
        name: &'static str,
        code: i32,
        output: String,
    },

    /// The worker task panicked or was aborted.
    #[error("task {name} aborted")]
    Aborted { name: &'static str },
}
