//! TaskExecutor — submit/wait over an async worker pool.
//!
//! `submit` spawns the operation onto the tokio pool immediately and
//! returns; nothing blocks until `wait`, which bounds the await with a
//! timeout. Operations for different nodes run concurrently; ordering
//! per node is the caller's responsibility (the lifecycle state machine
//! enforces it).

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::TaskError;
use crate::provisioner::{Provisioner, Task, TaskOutput};

/// Handle to a submitted provisioning operation.
pub struct TaskHandle {
    name: &'static str,
    join: JoinHandle<Result<TaskOutput, TaskError>>,
}

impl TaskHandle {
    /// Operation name this handle tracks.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Dispatches provisioning operations onto the tokio worker pool.
#[derive(Clone)]
pub struct TaskExecutor {
    provisioner: Arc<dyn Provisioner>,
}

impl TaskExecutor {
    pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
        Self { provisioner }
    }

    /// Submit an operation for immediate asynchronous execution.
    ///
    /// Returns without waiting; the operation runs on the worker pool
    /// until completion or until the handle's bounded wait aborts it.
    pub fn submit(&self, task: Task) -> TaskHandle {
        let name = task.name();
        let provisioner = self.provisioner.clone();
        debug!(task = name, "task submitted");

        let join = tokio::spawn(async move { run_task(provisioner, task).await });

        TaskHandle { name, join }
    }

    /// Wait for a submitted task, bounded by `timeout`.
    ///
    /// On timeout the task counts as failed and a best-effort abort is
    /// forwarded; the underlying remote operation is assumed to
    /// eventually self-terminate.
    pub async fn wait(
        &self,
        handle: TaskHandle,
        timeout: Duration,
    ) -> Result<TaskOutput, TaskError> {
        let TaskHandle { name, mut join } = handle;
        match tokio::time::timeout(timeout, &mut join).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                warn!(task = name, error = %join_err, "task worker aborted");
                Err(TaskError::Aborted { name })
            }
            Err(_) => {
                join.abort();
                warn!(task = name, ?timeout, "task timed out");
                Err(TaskError::Timeout { name, timeout })
            }
        }
    }
}

async fn run_task(
    provisioner: Arc<dyn Provisioner>,
    task: Task,
) -> Result<TaskOutput, TaskError> {
    let name = task.name();
    match task {
        Task::BuildLayer(req) => provisioner
            .build_layer(req)
            .await
            .map(|()| TaskOutput::Done)
            .map_err(|e| failed(name, e)),
        Task::DestroyLayer(req) => provisioner
            .destroy_layer(req)
            .await
            .map(|()| TaskOutput::Done)
            .map_err(|e| failed(name, e)),
        Task::LaunchNode(req) => provisioner
            .launch_node(req)
            .await
            .map(TaskOutput::Launched)
            .map_err(|e| failed(name, e)),
        Task::TerminateNode(req) => provisioner
            .terminate_node(req)
            .await
            .map(|()| TaskOutput::Done)
            .map_err(|e| failed(name, e)),
        Task::ConvergeNode(req) => {
            let result = provisioner
                .converge_node(req)
                .await
                .map_err(|e| failed(name, e))?;
            // Non-zero remote exit status is a failure by contract.
            if result.exit_code != 0 {
                return Err(TaskError::RemoteExit {
                    name,
                    code: result.exit_code,
                    output: result.output,
                });
            }
            Ok(TaskOutput::Converged {
                output: result.output,
            })
        }
    }
}

fn failed(name: &'static str, e: crate::provisioner::ProvisionError) -> TaskError {
    TaskError::Failed {
        name,
        message: e.0,
    }
}
