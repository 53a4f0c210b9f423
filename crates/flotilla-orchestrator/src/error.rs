//! Orchestrator error types.

use flotilla_balance::BalanceError;
use flotilla_lifecycle::LifecycleError;
use flotilla_state::{NodeState, StateError};
use thiserror::Error;

/// Result type alias for orchestrator operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Errors returned synchronously by orchestrator operations.
///
/// Per-node failures inside a converge pass do not surface here; they
/// land in the pass report while the call itself succeeds.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A referenced record does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Container demand with no running node to place it on.
    #[error(transparent)]
    NoCapacity(#[from] BalanceError),

    /// The node already has a provisioning operation in flight.
    #[error("node {node} already has an operation in flight (state {state:?})")]
    InFlightConflict { node: String, state: NodeState },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}
