//! flotilla-tasks — asynchronous provisioning operation dispatch.
//!
//! Provisioning operations (layer bootstrap/teardown, node launch/terminate,
//! node configuration convergence) are opaque remote calls with a fixed
//! result contract. This crate decouples the reconciliation logic from any
//! particular transport:
//!
//! - [`Provisioner`] is the seam to the cloud provider / remote execution
//!   channel — five operations, boxed-future methods, object safe.
//! - [`TaskExecutor`] spawns each submitted operation immediately on the
//!   tokio pool (unbounded concurrency) and hands back a [`TaskHandle`];
//!   the only blocking point is a bounded [`TaskExecutor::wait`].
//! - [`MockProvisioner`] is a deterministic in-process provisioner with
//!   failure injection, used by tests and standalone mode.
//!
//! Delivery is at-least-once; callers are expected to retry idempotently.

pub mod error;
pub mod executor;
pub mod mock;
pub mod provisioner;

pub use error::{TaskError, TaskResult};
pub use executor::{TaskExecutor, TaskHandle};
pub use mock::MockProvisioner;
pub use provisioner::*;
