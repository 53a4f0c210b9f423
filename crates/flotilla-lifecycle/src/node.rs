//! NodeDriver — drives a single node through its lifecycle.
//!
//! The state machine is authoritative: every transition is persisted
//! before and after the provisioning operation it brackets, so a crash
//! mid-operation leaves the node in an in-flight state that the next
//! converge pass can observe and recover. States are never skipped.
//!
//! ```text
//! requested --launch_submitted--> building
//! building   --launch_succeeded--> up
//! building   --launch_failed-----> requested      (bounded retries)
//! up         --converge_submitted-> converging
//! converging --converge_succeeded--> running
//! converging --converge_failed----> up            (bounded retries)
//! any non-terminal --terminate----> terminating
//! terminating--terminate_succeeded--> terminated  (record deleted)
//! terminating--terminate_failed-----> terminating (retried, backoff)
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use flotilla_state::{Layer, Node, NodeState, StateStore};
use flotilla_tasks::{
    ConvergeNodeRequest, LaunchNodeRequest, Task, TaskExecutor, TaskOutput, TerminateNodeRequest,
};

use crate::error::{LifecycleError, LifecycleResult};
use crate::retry::RetryPolicy;

/// Drives launch, converge, and terminate transitions for single nodes.
#[derive(Clone)]
pub struct NodeDriver {
    store: StateStore,
    executor: TaskExecutor,
    policy: RetryPolicy,
    /// Bounded wait per submitted task.
    task_timeout: Duration,
}

impl NodeDriver {
    pub fn new(
        store: StateStore,
        executor: TaskExecutor,
        policy: RetryPolicy,
        task_timeout: Duration,
    ) -> Self {
        Self {
            store,
            executor,
            policy,
            task_timeout,
        }
    }

    /// Launch a node. Valid only from `requested`.
    ///
    /// On success records the provider identifier (immutable once set)
    /// and moves the node to `up`. On failure retries up to the policy
    /// budget with exponential backoff, leaving the node in `requested`
    /// between attempts and after exhaustion.
    pub async fn launch(&self, node: &Node, layer: &Layer) -> LifecycleResult<Node> {
        if node.state != NodeState::Requested {
            return Err(LifecycleError::InvalidTransition {
                node: node.id.clone(),
                operation: "launch",
                from: node.state,
            });
        }

        let mut node = node.clone();
        let mut last_error = String::new();

        for attempt in 1..=self.policy.launch_attempts {
            node.state = NodeState::Building;
            node.launch_attempts = attempt;
            node.updated_at = epoch_secs();
            self.store.put_node(&node)?;

            let handle = self.executor.submit(Task::LaunchNode(LaunchNodeRequest {
                node_id: node.id.clone(),
                credentials: layer.credentials.clone(),
                params: layer.params.clone(),
                init_script: layer.init_script.clone(),
                ssh_username: layer.ssh_username.clone(),
                ssh_private_key: layer.ssh_private_key.clone(),
            }));

            match self.executor.wait(handle, self.task_timeout).await {
                Ok(TaskOutput::Launched(launched)) => {
                    node.state = NodeState::Up;
                    // Provider id is immutable once assigned.
                    if node.provider_id.is_none() {
                        node.provider_id = Some(launched.provider_id);
                    }
                    node.fqdn = Some(launched.fqdn);
                    node.metadata = launched.metadata;
                    node.launch_attempts = 0;
                    node.updated_at = epoch_secs();
                    self.store.put_node(&node)?;
                    info!(node = %node.id, provider_id = ?node.provider_id, "node launched");
                    return Ok(node);
                }
                Ok(other) => {
                    last_error = format!("unexpected launch output: {other:?}");
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            // Failed attempt: back to requested, retry after backoff.
            node.state = NodeState::Requested;
            node.updated_at = epoch_secs();
            self.store.put_node(&node)?;
            warn!(node = %node.id, attempt, error = %last_error, "launch failed");

            if attempt < self.policy.launch_attempts {
                tokio::time::sleep(self.policy.backoff(attempt)).await;
            }
        }

        Err(LifecycleError::ProvisioningFailed {
            node: node.id,
            attempts: self.policy.launch_attempts,
            reason: last_error,
        })
    }

    /// Apply the current release's configuration to a node over the
    /// remote execution channel. Valid from `up` or `running` — a node
    /// already `running` may converge again to reconcile drift and
    /// stays `running` on success.
    pub async fn converge(&self, node: &Node, layer: &Layer) -> LifecycleResult<Node> {
        if !matches!(node.state, NodeState::Up | NodeState::Running) {
            return Err(LifecycleError::InvalidTransition {
                node: node.id.clone(),
                operation: "converge",
                from: node.state,
            });
        }

        let Some(fqdn) = node.fqdn.clone() else {
            return Err(LifecycleError::ConvergeFailed {
                node: node.id.clone(),
                attempts: 0,
                reason: "node has no fqdn".to_string(),
            });
        };

        let mut node = node.clone();
        let mut last_error = String::new();

        for attempt in 1..=self.policy.converge_attempts {
            node.state = NodeState::Converging;
            node.converge_attempts = attempt;
            node.updated_at = epoch_secs();
            self.store.put_node(&node)?;

            let handle = self
                .executor
                .submit(Task::ConvergeNode(ConvergeNodeRequest {
                    node_id: node.id.clone(),
                    ssh_username: layer.ssh_username.clone(),
                    fqdn: fqdn.clone(),
                    ssh_private_key: layer.ssh_private_key.clone(),
                }));

            match self.executor.wait(handle, self.task_timeout).await {
                Ok(TaskOutput::Converged { output }) => {
                    node.state = NodeState::Running;
                    node.converge_attempts = 0;
                    node.updated_at = epoch_secs();
                    self.store.put_node(&node)?;
                    debug!(node = %node.id, output_len = output.len(), "node converged");
                    return Ok(node);
                }
                Ok(other) => {
                    last_error = format!("unexpected converge output: {other:?}");
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            // Non-zero exit or transport failure: back to up.
            node.state = NodeState::Up;
            node.updated_at = epoch_secs();
            self.store.put_node(&node)?;
            warn!(node = %node.id, attempt, error = %last_error, "converge failed");

            if attempt < self.policy.converge_attempts {
                tokio::time::sleep(self.policy.backoff(attempt)).await;
            }
        }

        Err(LifecycleError::ConvergeFailed {
            node: node.id,
            attempts: self.policy.converge_attempts,
            reason: last_error,
        })
    }

    /// Terminate a node. Valid from any non-terminal state.
    ///
    /// On success the node's record is deleted, freeing its slot in the
    /// layer. Failures keep the node `terminating` and retry with
    /// backoff; after exhaustion the error is surfaced while the record
    /// stays visible for operator action.
    pub async fn terminate(&self, node: &Node, layer: &Layer) -> LifecycleResult<()> {
        if node.state.is_terminal() {
            return Err(LifecycleError::InvalidTransition {
                node: node.id.clone(),
                operation: "terminate",
                from: node.state,
            });
        }

        let mut node = node.clone();

        // A node that never launched has no provider infrastructure;
        // dropping the record is the whole termination.
        let Some(provider_id) = node.provider_id.clone() else {
            self.store
                .delete_node(&node.formation_id, &node.layer, node.seq)?;
            info!(node = %node.id, "unlaunched node removed");
            return Ok(());
        };

        let mut last_error = String::new();

        for attempt in 1..=self.policy.terminate_attempts {
            node.state = NodeState::Terminating;
            node.updated_at = epoch_secs();
            self.store.put_node(&node)?;

            let handle = self
                .executor
                .submit(Task::TerminateNode(TerminateNodeRequest {
                    node_id: node.id.clone(),
                    credentials: layer.credentials.clone(),
                    params: layer.params.clone(),
                    provider_id: provider_id.clone(),
                }));

            match self.executor.wait(handle, self.task_timeout).await {
                Ok(_) => {
                    self.store
                        .delete_node(&node.formation_id, &node.layer, node.seq)?;
                    info!(node = %node.id, provider_id = %provider_id, "node terminated");
                    return Ok(());
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(node = %node.id, attempt, error = %last_error, "terminate failed");
                }
            }

            if attempt < self.policy.terminate_attempts {
                tokio::time::sleep(self.policy.backoff(attempt)).await;
            }
        }

        Err(LifecycleError::TerminateFailed {
            node: node.id,
            attempts: self.policy.terminate_attempts,
            reason: last_error,
        })
    }

    /// Map a node left in `building` or `converging` by an interrupted
    /// run back to its retry origin, so launch or converge can drive it
    /// again. Any other state passes through unchanged. `terminating`
    /// is not touched here; [`NodeDriver::terminate`] accepts it
    /// directly.
    pub fn recover(&self, node: &Node) -> LifecycleResult<Node> {
        let origin = match node.state {
            NodeState::Building => NodeState::Requested,
            NodeState::Converging => NodeState::Up,
            _ => return Ok(node.clone()),
        };

        warn!(node = %node.id, from = ?node.state, to = ?origin, "recovering stale in-flight node");
        let mut node = node.clone();
        node.state = origin;
        node.updated_at = epoch_secs();
        self.store.put_node(&node)?;
        Ok(node)
    }
}

/// Current Unix epoch in seconds.
pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
