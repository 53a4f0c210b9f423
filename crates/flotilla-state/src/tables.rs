//! redb table definitions for the Flotilla state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Composite keys follow the pattern `{formation}/{child}` or
//! `{formation}/{layer}:{seq}`; numeric components are zero-padded so that
//! key order equals creation order.

use redb::TableDefinition;

/// Formations keyed by `{formation_id}`.
pub const FORMATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("formations");

/// Layers keyed by `{formation_id}/{layer_name}`.
pub const LAYERS: TableDefinition<&str, &[u8]> = TableDefinition::new("layers");

/// Nodes keyed by `{formation_id}/{layer_name}:{seq:08}`.
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Builds keyed by `{formation_id}:{seq:08}` (append-only).
pub const BUILDS: TableDefinition<&str, &[u8]> = TableDefinition::new("builds");

/// Releases keyed by `{formation_id}:{version:08}` (append-only, gapless).
pub const RELEASES: TableDefinition<&str, &[u8]> = TableDefinition::new("releases");

/// Recorded container placement keyed by `{formation_id}`.
pub const PLACEMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("placements");
