//! flotilla-state — embedded state store for Flotilla.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! state management for formations, layers, nodes, builds, releases, and the
//! recorded container placement.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{formation}/{layer}`, `{formation}/{layer}:{seq}`) enable
//! efficient prefix scans for owned records, and zero-padded sequence numbers
//! make iteration order equal creation order.
//!
//! Release versions are allocated inside the same write transaction that
//! inserts the release, which keeps them strictly increasing and gapless
//! per formation.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
