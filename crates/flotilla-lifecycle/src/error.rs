//! Lifecycle error types.

use flotilla_state::NodeState;
use thiserror::Error;

/// Result type alias for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Errors that can occur while driving node and layer lifecycles.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Launch failed and the retry budget is exhausted; the node was
    /// left in `requested` for a later re-attempt.
    #[error("provisioning failed for node {node} after {attempts} attempt(s): {reason}")]
    ProvisioningFailed {
        node: String,
        attempts: u32,
        reason: String,
    },

    /// Remote configuration application failed; the node was returned
    /// to `up` and stays eligible for retry.
    #[error("convergence failed for node {node} after {attempts} attempt(s): {reason}")]
    ConvergeFailed {
        node: String,
        attempts: u32,
        reason: String,
    },

    /// Terminate kept failing; the node stays `terminating` so the
    /// leaked infrastructure remains visible for operator action.
    #[error("termination of node {node} still pending after {attempts} attempt(s): {reason}")]
    TerminateFailed {
        node: String,
        attempts: u32,
        reason: String,
    },

    /// Layer destroy attempted while it still owns live nodes.
    #[error("layer {layer} is not empty: {live} node(s) not terminated")]
    LayerNotEmpty { layer: String, live: u32 },

    /// Layer bootstrap failed; the layer was returned to `absent`.
    #[error("bootstrap of layer {layer} failed: {reason}")]
    BootstrapFailed { layer: String, reason: String },

    /// Layer teardown failed; the layer was returned to `ready`.
    #[error("destroy of layer {layer} failed: {reason}")]
    DestroyFailed { layer: String, reason: String },

    /// The requested operation is not legal from the node's state.
    #[error("node {node} cannot {operation} from state {from:?}")]
    InvalidTransition {
        node: String,
        operation: &'static str,
        from: NodeState,
    },

    #[error("state store error: {0}")]
    State(#[from] flotilla_state::StateError),
}
