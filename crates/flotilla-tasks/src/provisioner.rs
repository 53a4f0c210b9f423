//! The `Provisioner` trait — the seam to real infrastructure.
//!
//! Credentials and launch parameters are opaque pass-through values
//! supplied by the credential store; this crate never inspects them.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// Boxed future used to keep [`Provisioner`] object safe.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Error reported by a provisioning operation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ProvisionError(pub String);

/// Arguments for a layer bootstrap operation (e.g. create a security group).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildLayerRequest {
    pub layer_id: String,
    pub credentials: serde_json::Value,
    pub params: serde_json::Value,
}

/// Arguments for a layer teardown operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestroyLayerRequest {
    pub layer_id: String,
    pub credentials: serde_json::Value,
    pub params: serde_json::Value,
}

/// Arguments for a node launch operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchNodeRequest {
    pub node_id: String,
    pub credentials: serde_json::Value,
    pub params: serde_json::Value,
    pub init_script: String,
    pub ssh_username: String,
    pub ssh_private_key: String,
}

/// Arguments for a node terminate operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminateNodeRequest {
    pub node_id: String,
    pub credentials: serde_json::Value,
    pub params: serde_json::Value,
    pub provider_id: String,
}

/// Arguments for a configuration convergence run over the remote
/// execution channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergeNodeRequest {
    pub node_id: String,
    pub ssh_username: String,
    pub fqdn: String,
    pub ssh_private_key: String,
}

/// Result of a successful node launch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LaunchedNode {
    /// Provider-assigned instance identifier.
    pub provider_id: String,
    /// Last-observed provider status snapshot.
    pub metadata: BTreeMap<String, String>,
    /// Address the convergence channel will use.
    pub fqdn: String,
}

/// Result of a convergence run. A non-zero `exit_code` is a failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConvergeOutput {
    pub output: String,
    pub exit_code: i32,
}

/// The five provisioning operations the orchestration engine consumes.
///
/// Implementations wrap a cloud-provider SDK plus an SSH/agent channel;
/// [`crate::MockProvisioner`] is the in-process stand-in.
pub trait Provisioner: Send + Sync {
    fn build_layer(&self, req: BuildLayerRequest) -> BoxFuture<Result<(), ProvisionError>>;

    fn destroy_layer(&self, req: DestroyLayerRequest) -> BoxFuture<Result<(), ProvisionError>>;

    fn launch_node(&self, req: LaunchNodeRequest)
    -> BoxFuture<Result<LaunchedNode, ProvisionError>>;

    fn terminate_node(&self, req: TerminateNodeRequest) -> BoxFuture<Result<(), ProvisionError>>;

    fn converge_node(
        &self,
        req: ConvergeNodeRequest,
    ) -> BoxFuture<Result<ConvergeOutput, ProvisionError>>;
}

/// A provisioning operation ready for submission.
#[derive(Debug, Clone)]
pub enum Task {
    BuildLayer(BuildLayerRequest),
    DestroyLayer(DestroyLayerRequest),
    LaunchNode(LaunchNodeRequest),
    TerminateNode(TerminateNodeRequest),
    ConvergeNode(ConvergeNodeRequest),
}

impl Task {
    /// Stable operation name, used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BuildLayer(_) => "build_layer",
            Self::DestroyLayer(_) => "destroy_layer",
            Self::LaunchNode(_) => "launch_node",
            Self::TerminateNode(_) => "terminate_node",
            Self::ConvergeNode(_) => "converge_node",
        }
    }
}

/// Output of a completed task, by operation kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutput {
    /// build_layer, destroy_layer, terminate_node.
    Done,
    /// launch_node.
    Launched(LaunchedNode),
    /// converge_node (exit code zero; the text is the remote log).
    Converged { output: String },
}
