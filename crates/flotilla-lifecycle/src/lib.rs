//! flotilla-lifecycle — node and layer lifecycle management.
//!
//! Two managers own all mutations of node and layer records:
//!
//! - [`NodeDriver`] drives a single node through the lifecycle state
//!   machine (`requested → building → up → converging → running →
//!   terminating → terminated`), issuing launch/terminate/converge
//!   operations through the task executor with bounded retries and
//!   exponential backoff.
//! - [`LayerManager`] owns a named group of nodes sharing infrastructure
//!   parameters: bootstraps shared infrastructure before any node
//!   exists, computes scale deltas, and tears the layer down once every
//!   node is gone.
//!
//! Neither manager blocks on infrastructure beyond the bounded task
//! waits; the orchestrator composes them into full converge passes.

pub mod error;
pub mod layer;
pub mod node;
pub mod retry;

pub use error::{LifecycleError, LifecycleResult};
pub use layer::{LayerManager, ScaleDelta};
pub use node::NodeDriver;
pub use retry::RetryPolicy;
