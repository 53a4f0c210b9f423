//! flotilla-balance — container placement across running nodes.
//!
//! Given the running nodes of a formation and a desired replica count per
//! process type, computes which node hosts which container instance.
//! Placement is pure and deterministic — no hidden state — which keeps
//! convergence idempotent and testable: the same inputs always produce
//! the same plan.

pub mod balancer;

pub use balancer::{BalanceError, PlacementPlan, balance};
