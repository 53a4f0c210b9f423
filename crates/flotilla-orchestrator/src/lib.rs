//! flotilla-orchestrator — formation-level reconciliation.
//!
//! The [`Orchestrator`] composes the state store, the task executor, and
//! the lifecycle managers into the five formation operations:
//!
//! - `scale_layers` — adjust node counts per layer, fire-and-forget;
//! - `scale_containers` — adjust replica counts and rebalance placement;
//! - `balance` — recompute placement with unchanged targets;
//! - `calculate` — read-only desired-vs-actual topology report;
//! - `converge` — drive real infrastructure toward the desired topology
//!   and report per-node outcomes.
//!
//! Plus release bookkeeping: builds append, config writes and rollbacks
//! each cut a new immutable release.
//!
//! # Concurrency
//!
//! Converge passes on one formation serialize through a per-formation
//! async lock. Within a pass, layer bootstrap precedes every launch in
//! that layer and a node's launch precedes its converge; everything else
//! runs concurrently. Each node carries at most one in-flight operation,
//! enforced by an in-process claim set shared with the background
//! drivers that `scale_layers` spawns.

pub mod engine;
pub mod error;
pub mod releases;

pub use engine::{ConvergeReport, CountPair, NodeOutcome, Orchestrator, ScaleSummary, TopologyReport};
pub use error::{OrchestratorError, OrchestratorResult};
pub use releases::NewBuild;
